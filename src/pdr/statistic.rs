use giputils::statistic::{Average, CountedDuration, RunningTime, SuccessRate};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct Block {
    pub overall_time: Duration,
    pub num_obligations: usize,
    pub num_laf: usize,
    pub num_caf: usize,
    pub avg_cti_cube_len: Average,
    pub avg_lifted_cube_len: Average,
}

#[allow(unused)]
#[derive(Debug, Default)]
pub struct Statistic {
    pub time: RunningTime,

    pub num_rounds: usize,
    pub induction: SuccessRate,
    pub strengthening: SuccessRate,

    pub block: Block,

    pub propagation: SuccessRate,
    pub overall_propagate_time: Duration,

    pub num_refine: usize,
    pub num_exact_restart: usize,
    pub num_spurious_bmc: usize,
    pub bmc_time: CountedDuration,

    pub num_confirmed: usize,
    pub num_refuted: usize,
    pub num_restart: usize,
}
