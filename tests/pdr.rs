use rPDR::{
    AlgorithmStatus, Engine, Pdr, PdrError, PdrResult, Verdict,
    candidate::{CandidateInvariant, StaticCandidateGenerator},
    cfa::{Cfa, CfaBuilder, Location},
    config::{
        AbstractionStrategy, AdjustConditions, Config, InvariantStrengthening, LiftingStrategy,
    },
    logic::{Formula, Value, Variable},
    shutdown::ShutdownNotifier,
};
use std::collections::BTreeSet;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn config() -> Config {
    let mut cfg = Config::default();
    cfg.pdr.certify = true;
    cfg
}

fn run_with(cfg: Config, cfa: Cfa, candidates: Vec<CandidateInvariant>) -> (Pdr, PdrResult) {
    init_logger();
    let generator = Box::new(StaticCandidateGenerator::new(candidates));
    let mut pdr = Pdr::new(cfg, cfa, generator).unwrap();
    let res = pdr.check().unwrap();
    pdr.statistic();
    (pdr, res)
}

fn run(cfg: Config, cfa: Cfa) -> (Pdr, PdrResult) {
    let target = CandidateInvariant::target_locations(&cfa);
    run_with(cfg, cfa, vec![target])
}

/// the target location has no incoming edge
fn unreachable_target() -> Cfa {
    let mut b = CfaBuilder::new();
    let head = b.add_location("head");
    let err = b.add_location("error");
    b.entry(head).loop_head(head).target(err);
    b.edge(head, head, Formula::constant(true));
    b.build().unwrap()
}

/// head -> mid -> head, the error is left from mid when x holds, x never does
fn guarded_loop() -> (Cfa, Variable) {
    let mut b = CfaBuilder::new();
    let x = b.add_variable(Variable::bool("x"));
    let head = b.add_location("head");
    let mid = b.add_location("mid");
    let err = b.add_location("error");
    b.entry(head).loop_head(head).target(err);
    b.init(!Formula::var(&x, 0));
    b.assume_edge(head, mid, Formula::constant(true));
    b.assume_edge(mid, head, Formula::constant(true));
    b.assume_edge(mid, err, Formula::var(&x, 0));
    (b.build().unwrap(), x)
}

/// n counts up to `bound`, the error needs n = 7
fn counter(bound: u32) -> (Cfa, Variable) {
    counter_with_error(bound, 7)
}

/// n counts up to `bound`, the error needs n = `error`
fn counter_with_error(bound: u32, error: u32) -> (Cfa, Variable) {
    let mut b = CfaBuilder::new();
    let n = b.add_variable(Variable::finite("n", 8));
    let head = b.add_location("head");
    let err = b.add_location("error");
    b.entry(head).loop_head(head).target(err);
    b.init(Formula::eq_const(&n, 0, 0));
    for v in 0..bound {
        b.update_edge(
            head,
            head,
            Formula::eq_const(&n, 0, v),
            Formula::eq_const(&n, 1, v + 1),
            std::slice::from_ref(&n),
        );
    }
    b.assume_edge(head, err, Formula::eq_const(&n, 0, error));
    (b.build().unwrap(), n)
}

/// two loop heads, y := x on the way to `right`, x := y on the way back
fn two_location_loop() -> (Cfa, Variable, Location) {
    let mut b = CfaBuilder::new();
    let x = b.add_variable(Variable::bool("x"));
    let y = b.add_variable(Variable::bool("y"));
    let left = b.add_location("left");
    let right = b.add_location("right");
    b.entry(left).loop_head(left).loop_head(right);
    b.init(!Formula::var(&x, 0));
    b.init(!Formula::var(&y, 0));
    b.assign_edge(left, right, &y, Formula::var(&x, 0));
    b.assign_edge(right, left, &x, Formula::var(&y, 0));
    (b.build().unwrap(), y, right)
}

/// x toggles, y follows x one step behind, x and y are never both set
fn toggle() -> Cfa {
    let mut b = CfaBuilder::new();
    let x = b.add_variable(Variable::bool("x"));
    let y = b.add_variable(Variable::bool("y"));
    let head = b.add_location("head");
    let err = b.add_location("error");
    b.entry(head).loop_head(head).target(err);
    b.init(!Formula::var(&x, 0));
    b.init(!Formula::var(&y, 0));
    b.update_edge(
        head,
        head,
        Formula::constant(true),
        Formula::and([
            Formula::iff(Formula::var(&x, 1), !Formula::var(&x, 0)),
            Formula::iff(Formula::var(&y, 1), Formula::var(&x, 0)),
        ]),
        &[x.clone(), y.clone()],
    );
    b.assume_edge(
        head,
        err,
        Formula::and([Formula::var(&x, 0), Formula::var(&y, 0)]),
    );
    b.build().unwrap()
}

/// z is havocked every iteration, x toggles, the error needs x and z
fn havoc(reachable: bool) -> Cfa {
    let mut b = CfaBuilder::new();
    let x = b.add_variable(Variable::bool("x"));
    let z = b.add_variable(Variable::bool("z"));
    let head = b.add_location("head");
    let err = b.add_location("error");
    b.entry(head).loop_head(head).target(err);
    b.init(!Formula::var(&x, 0));
    let update = if reachable {
        Formula::iff(Formula::var(&x, 1), !Formula::var(&x, 0))
    } else {
        Formula::iff(Formula::var(&x, 1), Formula::var(&x, 0))
    };
    b.update_edge(
        head,
        head,
        Formula::constant(true),
        update,
        &[x.clone(), z.clone()],
    );
    b.assume_edge(
        head,
        err,
        Formula::and([Formula::var(&x, 0), Formula::var(&z, 0)]),
    );
    b.build().unwrap()
}

fn assert_safe(res: &PdrResult) {
    assert_eq!(res.status, AlgorithmStatus::SoundAndPrecise);
    assert_eq!(res.verdict, Verdict::Safe);
}

fn assert_unsafe(res: &PdrResult, cfa_target: Location) -> usize {
    assert_eq!(res.status, AlgorithmStatus::UnsoundAndPrecise);
    let cex = res.counterexample().expect("counterexample");
    assert_eq!(cex.last().map(|s| s.location), Some(cfa_target));
    cex.len()
}

fn error_location(cfa: &Cfa) -> Location {
    *cfa.targets().iter().next().unwrap()
}

#[test]
fn unreachable_target_is_safe() {
    let cfa = unreachable_target();
    let target = CandidateInvariant::target_locations(&cfa);
    let (pdr, res) = run(config(), cfa);
    assert_safe(&res);
    assert_eq!(pdr.frames().frontier(), 0);
    assert!(pdr.generator().confirmed().contains(&target));
}

#[test]
fn false_at_the_target_is_the_target() {
    let cfa = unreachable_target();
    let stated = CandidateInvariant::symbolic(
        &cfa,
        Some(cfa.targets().clone()),
        Formula::constant(false),
    );
    assert!(stated.is_primary_target());
    let (pdr, res) = run_with(config(), cfa, vec![stated.clone()]);
    assert_safe(&res);
    assert_eq!(pdr.frames().frontier(), 0);
    assert!(pdr.generator().confirmed().contains(&stated));
}

#[test]
fn confirmation_once_propagation_empties_a_frame() {
    let (cfa, y, right) = two_location_loop();
    let root = CandidateInvariant::symbolic(
        &cfa,
        Some(BTreeSet::from([right])),
        !Formula::var(&y, 0),
    );
    for lifting in [LiftingStrategy::None, LiftingStrategy::UnsatCore] {
        let mut cfg = config();
        cfg.pdr.lifting = lifting;
        let (pdr, res) = run_with(cfg, cfa.clone(), vec![root.clone()]);
        assert_eq!(res.status, AlgorithmStatus::SoundAndPrecise);
        assert_eq!(res.verdict, Verdict::Unknown);
        assert!(pdr.generator().confirmed().contains(&root));
        assert_eq!(pdr.frames().frontier(), 2);
        assert!(pdr.frames().frame(1).is_some_and(|f| f.is_empty()));
        assert!(pdr.frames().frame(2).is_some_and(|f| f.contains(&root)));
    }
}

#[test]
fn loop_with_inductive_strengthening() {
    let (cfa, _) = guarded_loop();
    let target = CandidateInvariant::target_locations(&cfa);
    let (pdr, res) = run(config(), cfa);
    assert_safe(&res);
    assert!(pdr.generator().confirmed().contains(&target));
    assert!(!pdr.generator().has_candidates_available());
}

#[test]
fn target_reachable_in_one_step() {
    let mut b = CfaBuilder::new();
    let head = b.add_location("head");
    let err = b.add_location("error");
    b.entry(head).loop_head(head).target(err);
    b.assume_edge(head, err, Formula::constant(true));
    let (_, res) = run(config(), b.build().unwrap());
    assert_eq!(assert_unsafe(&res, err), 2);
}

#[test]
fn entry_is_a_target() {
    let mut b = CfaBuilder::new();
    let head = b.add_location("head");
    b.entry(head).loop_head(head).target(head);
    let (_, res) = run(config(), b.build().unwrap());
    assert_eq!(assert_unsafe(&res, head), 1);
}

#[test]
fn bounded_counter_is_safe() {
    let (cfa, _) = counter(5);
    let (_, res) = run(config(), cfa);
    assert_safe(&res);
}

#[test]
fn counter_reaches_the_error() {
    let (cfa, n) = counter(7);
    let err = error_location(&cfa);
    let (_, res) = run(config(), cfa);
    assert_eq!(assert_unsafe(&res, err), 9);
    let cex = res.counterexample().unwrap();
    for (i, s) in cex.states.iter().take(8).enumerate() {
        assert_eq!(s.value(&n), Some(Value::Finite(i as u32)));
    }
}

#[test]
fn every_lifting_and_strengthening_agrees() {
    for lifting in [
        LiftingStrategy::None,
        LiftingStrategy::UnsatCore,
        LiftingStrategy::Abstraction,
    ] {
        for strengthening in [InvariantStrengthening::None, InvariantStrengthening::UnsatCore] {
            let mut cfg = config();
            cfg.pdr.lifting = lifting;
            cfg.pdr.strengthening = strengthening;
            let (_, res) = run(cfg.clone(), toggle());
            assert_safe(&res);
            let (cfa, _) = counter(7);
            let err = error_location(&cfa);
            let (_, res) = run(cfg, cfa);
            assert_eq!(assert_unsafe(&res, err), 9);
        }
    }
}

#[test]
fn localization_abstraction() {
    for threshold in [0, 1, 3] {
        let mut cfg = config();
        cfg.pdr.abstraction = AbstractionStrategy::Localization;
        cfg.pdr.lifting = LiftingStrategy::Abstraction;
        cfg.pdr.spurious_threshold = threshold;
        let (_, res) = run(cfg.clone(), havoc(false));
        assert_safe(&res);
        let cfa = havoc(true);
        let err = error_location(&cfa);
        let (_, res) = run(cfg.clone(), cfa);
        assert!(assert_unsafe(&res, err) >= 3);
        let (_, res) = run(cfg, toggle());
        assert_safe(&res);
    }
}

#[test]
fn auxiliary_candidates() {
    let (cfa, x) = guarded_loop();
    let target = CandidateInvariant::target_locations(&cfa);
    let wrong = CandidateInvariant::global(&cfa, Formula::var(&x, 0));
    let right = CandidateInvariant::global(&cfa, !Formula::var(&x, 0));
    let (pdr, res) = run_with(config(), cfa, vec![wrong.clone(), right.clone(), target.clone()]);
    assert_safe(&res);
    let confirmed = pdr.generator().confirmed();
    assert!(confirmed.contains(&right));
    assert!(confirmed.contains(&target));
    assert!(!confirmed.contains(&wrong));
}

#[test]
fn refuted_auxiliary_roots_do_not_hide_the_target() {
    let strategies = [
        (LiftingStrategy::None, InvariantStrengthening::None),
        (LiftingStrategy::None, InvariantStrengthening::UnsatCore),
        (LiftingStrategy::UnsatCore, InvariantStrengthening::None),
        (LiftingStrategy::UnsatCore, InvariantStrengthening::UnsatCore),
    ];
    for error in [3, 4, 5] {
        for (lifting, strengthening) in strategies {
            let mut cfg = config();
            cfg.pdr.lifting = lifting;
            cfg.pdr.strengthening = strengthening;
            let (cfa, n) = counter_with_error(7, error);
            let err = error_location(&cfa);
            // both hold for the first step, so they become roots first
            let before =
                CandidateInvariant::global(&cfa, !Formula::eq_const(&n, 0, error - 1));
            let at = CandidateInvariant::global(&cfa, !Formula::eq_const(&n, 0, error));
            let target = CandidateInvariant::target_locations(&cfa);
            let (pdr, res) = run_with(cfg, cfa, vec![target, before.clone(), at.clone()]);
            assert_eq!(assert_unsafe(&res, err), error as usize + 2);
            let confirmed = pdr.generator().confirmed();
            assert!(!confirmed.contains(&before));
            assert!(!confirmed.contains(&at));
        }
    }
}

#[test]
fn refuted_live_root_keeps_a_safe_verdict() {
    let (cfa, n) = counter(5);
    let wrong = CandidateInvariant::global(&cfa, !Formula::eq_const(&n, 0, 3));
    let target = CandidateInvariant::target_locations(&cfa);
    let (pdr, res) = run_with(config(), cfa, vec![wrong.clone(), target.clone()]);
    assert_safe(&res);
    let confirmed = pdr.generator().confirmed();
    assert!(confirmed.contains(&target));
    assert!(!confirmed.contains(&wrong));
    assert!(!pdr.frames().is_root(&wrong));
}

#[test]
fn without_primary_target_the_verdict_is_unknown() {
    let (cfa, x) = guarded_loop();
    let right = CandidateInvariant::global(&cfa, !Formula::var(&x, 0));
    let (_, res) = run_with(config(), cfa, vec![right]);
    assert_eq!(res.status, AlgorithmStatus::SoundAndPrecise);
    assert_eq!(res.verdict, Verdict::Unknown);
}

#[test]
fn condition_adjustment() {
    let mut cfg = config();
    cfg.pdr.adjust = AdjustConditions::Always;
    cfg.pdr.max_k = 3;
    let (pdr, res) = run(cfg.clone(), toggle());
    assert_safe(&res);
    assert_eq!(pdr.k(), 3);

    cfg.pdr.fail_on_exhaustion = true;
    let (pdr, res) = run(cfg.clone(), toggle());
    assert_eq!(res.status, AlgorithmStatus::UnsoundAndPrecise);
    assert_eq!(res.verdict, Verdict::Unknown);
    assert_eq!(pdr.k(), 3);

    // a deeper unrolling finds the error in the initial check
    let (cfa, _) = counter(7);
    let err = error_location(&cfa);
    cfg.pdr.max_k = 8;
    let (pdr, res) = run(cfg, cfa);
    assert_eq!(assert_unsafe(&res, err), 9);
    assert!(pdr.k() <= 8);
}

#[test]
fn cancellation() {
    init_logger();
    let (cfa, _) = counter(5);
    let target = CandidateInvariant::target_locations(&cfa);
    let shutdown = ShutdownNotifier::new();
    let mut pdr = Pdr::new(
        config(),
        cfa,
        Box::new(StaticCandidateGenerator::new([target])),
    )
    .unwrap()
    .with_shutdown_notifier(shutdown.clone());
    shutdown.request_shutdown("requested by test");
    assert_eq!(
        pdr.check(),
        Err(PdrError::Interrupted("requested by test".to_string()))
    );
    assert_eq!(pdr.last_result().verdict, Verdict::Unknown);

    let (cfa, _) = counter(5);
    let mut cfg = config();
    cfg.time_limit = Some(0);
    let target = CandidateInvariant::target_locations(&cfa);
    let mut pdr = Pdr::new(cfg, cfa, Box::new(StaticCandidateGenerator::new([target]))).unwrap();
    assert!(matches!(pdr.check(), Err(PdrError::Interrupted(_))));
}
