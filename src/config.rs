use clap::{Args, Parser, ValueEnum};

/// rPDR engine configuration
#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub struct Config {
    #[command(flatten)]
    pub pdr: PdrOptions,

    /// overall time limit in seconds
    #[arg(long = "time-limit")]
    pub time_limit: Option<u64>,
}

#[derive(Copy, Clone, ValueEnum, Debug, PartialEq, Eq)]
pub enum LiftingStrategy {
    /// block the concrete predecessor state
    None,
    /// keep the predecessor literals in the unsat core of the lifting query
    UnsatCore,
    /// unsat core lifting projected onto the abstraction precision
    Abstraction,
}

impl LiftingStrategy {
    #[inline]
    pub fn can_lift(&self) -> bool {
        !matches!(self, LiftingStrategy::None)
    }
}

#[derive(Copy, Clone, ValueEnum, Debug, PartialEq, Eq)]
pub enum AbstractionStrategy {
    /// no abstraction
    None,
    /// localization abstraction over the visible state variables
    Localization,
}

#[derive(Copy, Clone, ValueEnum, Debug, PartialEq, Eq)]
pub enum InvariantStrengthening {
    /// learn the blocked cube as is
    None,
    /// drop cube literals outside the unsat core of the induction check
    UnsatCore,
}

#[derive(Copy, Clone, ValueEnum, Debug, PartialEq, Eq)]
pub enum AdjustConditions {
    /// keep the unrolling depth
    Never,
    /// increase the unrolling depth after every round
    Always,
}

#[derive(Args, Clone, Debug)]
pub struct PdrOptions {
    /// counterexample to induction lifting
    #[arg(long = "pdr-lifting", value_enum, default_value_t = LiftingStrategy::UnsatCore)]
    pub lifting: LiftingStrategy,

    /// state abstraction of proof obligations
    #[arg(long = "pdr-abstraction", value_enum, default_value_t = AbstractionStrategy::None)]
    pub abstraction: AbstractionStrategy,

    /// strengthening of blocking clauses
    #[arg(long = "pdr-strengthening", value_enum, default_value_t = InvariantStrengthening::UnsatCore)]
    pub strengthening: InvariantStrengthening,

    /// spurious transitions tolerated before an abstraction failure is refined
    #[arg(long = "pdr-spurious-threshold", default_value_t = 1)]
    pub spurious_threshold: usize,

    /// condition adjustment policy
    #[arg(long = "pdr-adjust", value_enum, default_value_t = AdjustConditions::Never)]
    pub adjust: AdjustConditions,

    /// initial unrolling depth
    #[arg(long = "pdr-initial-k", default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub initial_k: u32,

    /// max unrolling depth of condition adjustment
    #[arg(long = "pdr-max-k", default_value_t = 8)]
    pub max_k: u32,

    /// report an unsound result when the unrolling depth cannot grow further
    #[arg(long = "pdr-fail-on-exhaustion", default_value_t = false)]
    pub fail_on_exhaustion: bool,

    /// recheck the inductive invariant with a fresh prover
    #[arg(long = "pdr-certify", default_value_t = false)]
    pub certify: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config::parse_from([""])
    }
}

impl Default for PdrOptions {
    fn default() -> Self {
        Config::default().pdr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.pdr.lifting, LiftingStrategy::UnsatCore);
        assert_eq!(cfg.pdr.abstraction, AbstractionStrategy::None);
        assert_eq!(cfg.pdr.spurious_threshold, 1);
        assert_eq!(cfg.pdr.initial_k, 1);
        assert_eq!(cfg.pdr.max_k, 8);
        assert!(cfg.time_limit.is_none());
    }

    #[test]
    fn parse_options() {
        let cfg = Config::parse_from([
            "",
            "--pdr-lifting",
            "abstraction",
            "--pdr-abstraction",
            "localization",
            "--pdr-adjust",
            "always",
            "--pdr-max-k",
            "3",
            "--pdr-certify",
        ]);
        assert!(cfg.pdr.lifting.can_lift());
        assert_eq!(cfg.pdr.abstraction, AbstractionStrategy::Localization);
        assert_eq!(cfg.pdr.adjust, AdjustConditions::Always);
        assert_eq!(cfg.pdr.max_k, 3);
        assert!(cfg.pdr.certify);
        assert!(Config::try_parse_from(["", "--pdr-initial-k", "0"]).is_err());
    }
}
