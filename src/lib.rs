#![allow(non_snake_case)]

pub mod candidate;
pub mod cfa;
pub mod config;
pub mod error;
pub mod logic;
pub mod pdr;
pub mod shutdown;
pub mod transys;

pub use error::{PdrError, Result};
pub use pdr::{AlgorithmStatus, Pdr, PdrResult, Verdict};

pub trait Engine {
    fn check(&mut self) -> Result<PdrResult>;

    fn statistic(&mut self) {}
}
