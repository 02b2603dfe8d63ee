pub mod counted_sqr_wav_pio;
