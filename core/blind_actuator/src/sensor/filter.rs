/// Slots in the position filter
pub const WINDOW: usize = 5;

/// Circular moving average over the last `N` samples
///
/// The first sample fills every slot so a cold filter does not drag readings towards zero.
pub struct MovingAverage<const N: usize> {
    slots: [u16; N],
    index: usize,
    primed: bool,
}

impl<const N: usize> MovingAverage<N> {
    pub const fn new() -> Self {
        Self {
            slots: [0; N],
            index: 0,
            primed: false,
        }
    }

    /// A filter that behaves as if it had already seen `N` samples of `value`
    pub const fn filled(value: u16) -> Self {
        Self {
            slots: [value; N],
            index: 0,
            primed: true,
        }
    }

    pub fn push(&mut self, sample: u16) -> u16 {
        if self.primed {
            self.slots[self.index] = sample;
        } else {
            self.slots = [sample; N];
            self.primed = true;
        }
        self.index = (self.index + 1) % N;

        self.average()
    }

    pub fn average(&self) -> u16 {
        let sum: u32 = self.slots.iter().map(|&s| s as u32).sum();
        (sum / N as u32) as u16
    }
}

impl<const N: usize> Default for MovingAverage<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_primes_every_slot() {
        let mut filter = MovingAverage::<WINDOW>::new();

        assert_eq!(filter.push(2000), 2000);
        assert_eq!(filter.push(2500), 2100);
    }

    #[test]
    fn one_outlier_moves_a_steady_average_by_a_fifth() {
        let mut filter = MovingAverage::<WINDOW>::filled(1000);

        assert_eq!(filter.average(), 1000);
        assert_eq!(filter.push(1200), 1040);
    }

    #[test]
    fn oldest_sample_is_evicted() {
        let mut filter = MovingAverage::<WINDOW>::filled(0);
        for _ in 0..WINDOW {
            filter.push(500);
        }
        assert_eq!(filter.average(), 500);

        filter.push(1000);
        assert_eq!(filter.average(), 600);
    }
}
