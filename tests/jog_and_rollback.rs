//! Integration tests for jogs, temporary rigidity and batch rollback

use cell_constraints::check::{check, DefectCategory};
use cell_constraints::design::{CellId, Design, NodeId, Point};
use cell_constraints::{
    load, parse, run, ConstraintEngine, DesignError, NodeDelta, PropagationConfig,
    PropagationError,
};
use pretty_assertions::assert_eq;
use tracing_test::traced_test;

const TECH: &str = r#"
    primitive pin [pin] { port p }
    primitive gate [size: (10, 10)] { port a }
    arcproto metal [width: 1, pin: pin]
    arcproto poly [width: 1]
    primitive offpin [size: (2, 2), pin] { port p [lx: 0.5, hx: 0.5] }
    arcproto wire [width: 1, pin: offpin]
    primitive stub [pin]
    arcproto bare [width: 1, pin: stub]
"#;

const TOLERANCE: f64 = 1e-6;

fn load_design(cells: &str) -> Result<Design, String> {
    let source = format!("{TECH}{cells}");
    let doc = parse(&source).map_err(|e| format!("Parse error: {:?}", e))?;
    let loaded = load(&doc).map_err(|e| format!("Load error: {:?}", e))?;
    Ok(loaded.design)
}

fn top(design: &Design) -> CellId {
    design.find_cell("top").expect("cell 'top' not found")
}

fn node(design: &Design, name: &str) -> NodeId {
    design
        .find_node(top(design), name)
        .unwrap_or_else(|| panic!("node '{}' not found", name))
}

fn center(design: &Design, name: &str) -> Point {
    design.node(node(design, name)).unwrap().geometry.center
}

/// Horizontal fixed-angle arc to a node that cannot move
fn locked_target(proto: &str) -> String {
    format!(
        r#"
        cell top {{
            node a: gate
            node b: gate at (40, 0) [locked]
            arc w: {proto} a.a -- b.a [fixed_angle]
        }}
    "#
    )
}

#[test]
fn test_jog_replaces_arc_with_three_segments() {
    let mut design = load_design(&locked_target("metal")).unwrap();
    let nets_before = design.nets(top(&design)).unwrap();
    let a = node(&design, "a");

    let mut engine = ConstraintEngine::new(PropagationConfig::default());
    let report = engine
        .modify_node(&mut design, a, NodeDelta::translate(0.0, 5.0))
        .unwrap();

    assert_eq!(report.stats.jogs, 1);
    assert_eq!(report.stats.failed_jogs, 0);
    let cell = design.cell(top(&design)).unwrap();
    assert_eq!(cell.arcs.len(), 3);
    assert_eq!(cell.nodes.len(), 4);

    // The middle segment inherits the name
    let w = design.arc(design.find_arc(top(&design), "w").unwrap()).unwrap();
    assert!(w.head().location.approx_eq(Point::new(20.0, 5.0), TOLERANCE));
    assert!(w.tail().location.approx_eq(Point::new(20.0, 0.0), TOLERANCE));
    assert!(w.fixed_angle);

    assert_eq!(design.nets(top(&design)).unwrap(), nets_before);
    assert!(check(&design).unwrap().is_empty());
}

#[test]
fn test_jog_then_reverse_keeps_connectivity() {
    let mut design = load_design(&locked_target("metal")).unwrap();
    let nets_before = design.nets(top(&design)).unwrap();
    assert_eq!(nets_before, vec![vec!["a.a".to_string(), "b.a".to_string()]]);
    let a = node(&design, "a");

    let mut engine = ConstraintEngine::new(PropagationConfig::default());
    engine
        .modify_node(&mut design, a, NodeDelta::translate(0.0, 5.0))
        .unwrap();
    engine
        .modify_node(&mut design, a, NodeDelta::translate(0.0, -5.0))
        .unwrap();

    assert!(center(&design, "a").approx_eq(Point::new(0.0, 0.0), TOLERANCE));
    assert_eq!(design.nets(top(&design)).unwrap(), nets_before);
    assert!(check(&design).unwrap().is_empty());
}

#[test]
fn test_undo_removes_jog() {
    let mut design = load_design(&locked_target("metal")).unwrap();
    let a = node(&design, "a");

    let mut engine = ConstraintEngine::new(PropagationConfig::default());
    let report = engine
        .modify_node(&mut design, a, NodeDelta::translate(0.0, 5.0))
        .unwrap();
    report.undo(&mut design).unwrap();

    let cell = design.cell(top(&design)).unwrap();
    assert_eq!(cell.arcs.len(), 1);
    assert_eq!(cell.nodes.len(), 2);
    let w = design.arc(design.find_arc(top(&design), "w").unwrap()).unwrap();
    assert_eq!(w.head().location, Point::new(0.0, 0.0));
    assert_eq!(w.tail().location, Point::new(40.0, 0.0));
    assert_eq!(center(&design, "a"), Point::new(0.0, 0.0));
}

#[test]
#[traced_test]
fn test_jog_without_pin_is_abandoned() {
    let mut design = load_design(&locked_target("poly")).unwrap();
    let a = node(&design, "a");

    let mut engine = ConstraintEngine::new(PropagationConfig::default());
    let report = engine
        .modify_node(&mut design, a, NodeDelta::translate(0.0, 5.0))
        .unwrap();

    assert_eq!(report.stats.jogs, 0);
    assert_eq!(report.stats.failed_jogs, 1);
    assert!(logs_contain("could not jog arc"));

    // The node still moved; only the arc update was given up
    assert!(center(&design, "a").approx_eq(Point::new(0.0, 5.0), TOLERANCE));
    assert_eq!(design.cell(top(&design)).unwrap().arcs.len(), 1);
    let defects = check(&design).unwrap();
    assert_eq!(defects.len(), 1);
    assert_eq!(defects[0].category, DefectCategory::Disconnected);
}

#[test]
fn test_jog_puts_off_centre_pin_ports_on_the_corners() {
    let mut design = load_design(&locked_target("wire")).unwrap();
    let a = node(&design, "a");

    let mut engine = ConstraintEngine::new(PropagationConfig::default());
    let report = engine
        .modify_node(&mut design, a, NodeDelta::translate(0.0, 5.0))
        .unwrap();

    assert_eq!(report.stats.jogs, 1);
    assert_eq!(report.stats.failed_jogs, 0);
    let w = design.arc(design.find_arc(top(&design), "w").unwrap()).unwrap();
    assert!(w.head().location.approx_eq(Point::new(20.0, 5.0), TOLERANCE));
    assert!(w.tail().location.approx_eq(Point::new(20.0, 0.0), TOLERANCE));
    // The port sits one unit right of the pin centre
    assert!(center(&design, "jog1").approx_eq(Point::new(19.0, 5.0), TOLERANCE));
    assert!(center(&design, "jog2").approx_eq(Point::new(19.0, 0.0), TOLERANCE));
    assert!(check(&design).unwrap().is_empty());
}

#[test]
fn test_arc_stays_live_after_failed_jog() {
    let mut design = load_design(&locked_target("bare")).unwrap();
    let a = node(&design, "a");
    let b = node(&design, "b");

    let mut engine = ConstraintEngine::new(PropagationConfig::default());
    let mut batch = engine.start_batch(&mut design);
    batch.modify_node(a, NodeDelta::translate(0.0, 5.0)).unwrap();
    // The abandoned arc is still propagated by a later edit in the batch
    batch.modify_node(b, NodeDelta::translate(0.0, 5.0)).unwrap();
    let report = batch.end_batch().unwrap();

    assert_eq!(report.stats.failed_jogs, 1);
    assert_eq!(report.stats.jogs, 0);
    let cell = design.cell(top(&design)).unwrap();
    assert_eq!(cell.arcs.len(), 1);
    assert_eq!(cell.nodes.len(), 2);
    let w = design.arc(design.find_arc(top(&design), "w").unwrap()).unwrap();
    assert!(w.head().location.approx_eq(Point::new(0.0, 5.0), TOLERANCE));
    assert!(w.tail().location.approx_eq(Point::new(40.0, 5.0), TOLERANCE));
    assert!(check(&design).unwrap().is_empty());
}

#[test]
fn test_temporary_rigidity_lasts_one_batch() {
    let output = run(&format!(
        r#"{TECH}
        cell top {{
            node a: pin
            node b: pin at (10, 0)
            arc w: metal a -- b
        }}
        batch {{
            rigid top.w
            move top.a [dy: 5]
        }}
        batch {{ move top.a [dy: 5] }}
    "#
    ))
    .unwrap();

    let design = &output.design;
    assert!(center(design, "a").approx_eq(Point::new(0.0, 10.0), TOLERANCE));
    assert!(center(design, "b").approx_eq(Point::new(10.0, 5.0), TOLERANCE));
}

#[test]
fn test_temporary_flexibility_overrides_rigid_flag() {
    let output = run(&format!(
        r#"{TECH}
        cell top {{
            node a: pin
            node b: pin at (10, 0)
            arc w: metal a -- b [rigid]
        }}
        batch {{
            flexible top.w
            move top.a [dy: 5]
        }}
    "#
    ))
    .unwrap();

    assert!(center(&output.design, "b").approx_eq(Point::new(10.0, 0.0), TOLERANCE));
}

#[test]
fn test_failed_batch_rolls_back() {
    let mut design = load_design(
        r#"
        cell top {
            node a: pin
            node b: pin at (10, 0)
            arc w: metal a -- b [rigid]
        }
    "#,
    )
    .unwrap();
    let a = node(&design, "a");
    let missing = NodeId(999);

    let mut engine = ConstraintEngine::new(PropagationConfig::default());
    let mut batch = engine.start_batch(&mut design);
    let err = batch
        .modify_nodes(
            &[a, missing],
            &[NodeDelta::translate(5.0, 0.0), NodeDelta::translate(1.0, 0.0)],
        )
        .unwrap_err();
    assert_eq!(err, PropagationError::Design(DesignError::UnknownNode(missing)));
    assert!(batch.is_aborted());
    assert_eq!(
        batch.modify_node(a, NodeDelta::translate(1.0, 0.0)),
        Err(PropagationError::BatchAborted)
    );
    assert_eq!(batch.end_batch().unwrap_err(), PropagationError::BatchAborted);

    assert_eq!(center(&design, "a"), Point::new(0.0, 0.0));
    assert_eq!(center(&design, "b"), Point::new(10.0, 0.0));
}

#[test]
fn test_mismatched_deltas_rejected() {
    let mut design = load_design("cell top { node a: pin }").unwrap();
    let a = node(&design, "a");
    let mut engine = ConstraintEngine::new(PropagationConfig::default());
    let mut batch = engine.start_batch(&mut design);
    assert_eq!(
        batch.modify_nodes(&[a], &[]),
        Err(PropagationError::MismatchedDeltas { nodes: 1, deltas: 0 })
    );
}
