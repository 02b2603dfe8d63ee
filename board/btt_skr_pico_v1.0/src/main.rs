#![no_std]
#![no_main]

mod board;

use crate::board::BoardInitialize;
use blind_actuator::board::rp::Board;
use blind_actuator::board::ConfigurableDriver;
use embassy_executor::Spawner;
use {defmt_rtt as _, panic_probe as _};

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let mut board = Board::init();
    board.configure_driver().await;

    blind_actuator::board::rp::run(spawner, board).await;
}
