//! Integration tests for arc propagation: each test builds a small cell,
//! runs one batch through the engine and checks the geometry that comes
//! out against what the wires' rigidity and angle flags require.

use cell_constraints::check::check;
use cell_constraints::design::{CellId, Design, NodeId, Point};
use cell_constraints::{load, parse, BatchReport, ConstraintEngine, NodeDelta, PropagationConfig};
use pretty_assertions::assert_eq;

const TECH: &str = r#"
    primitive pin [pin] { port p }
    primitive gate [size: (10, 10)] { port a }
    primitive anchor [size: (4, 4), locked] { port a }
    arcproto metal [width: 1, pin: pin]
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

fn arc_ends(design: &Design, name: &str) -> (Point, Point) {
    let id = design
        .find_arc(top(design), name)
        .unwrap_or_else(|| panic!("arc '{}' not found", name));
    let arc = design.arc(id).unwrap();
    (arc.head().location, arc.tail().location)
}

fn assert_near(actual: Point, expected: Point) {
    assert!(
        actual.approx_eq(expected, TOLERANCE),
        "expected ({}, {}), got ({}, {})",
        expected.x,
        expected.y,
        actual.x,
        actual.y
    );
}

fn edit(design: &mut Design, name: &str, delta: NodeDelta) -> BatchReport {
    let id = node(design, name);
    let mut engine = ConstraintEngine::new(PropagationConfig::default());
    engine
        .modify_node(design, id, delta)
        .expect("batch should succeed")
}

#[test]
fn test_rigid_arc_drags_far_node() {
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

    edit(&mut design, "a", NodeDelta::translate(3.0, 4.0));

    assert_near(center(&design, "b"), Point::new(13.0, 4.0));
    let (head, tail) = arc_ends(&design, "w");
    assert_near(head, Point::new(3.0, 4.0));
    assert_near(tail, Point::new(13.0, 4.0));
}

#[test]
fn test_editing_a_node_twice_in_one_batch_is_ignored() {
    let mut design = load_design("cell top { node a: pin }").unwrap();
    let a = node(&design, "a");
    let mut engine = ConstraintEngine::new(PropagationConfig::default());

    let mut batch = engine.start_batch(&mut design);
    batch
        .modify_nodes(
            &[a, a],
            &[NodeDelta::translate(5.0, 0.0), NodeDelta::translate(7.0, 0.0)],
        )
        .unwrap();
    batch.modify_node(a, NodeDelta::translate(100.0, 0.0)).unwrap();
    let report = batch.end_batch().unwrap();

    assert_near(center(&design, "a"), Point::new(5.0, 0.0));
    assert_eq!(report.stats.nodes_altered, 1);
}

#[test]
fn test_rigid_ring_terminates_in_one_visit_per_node() {
    let mut design = load_design(
        r#"
        cell top {
            node p0: pin
            node p1: pin at (10, 0)
            node p2: pin at (20, 0)
            node p3: pin at (20, 10)
            node p4: pin at (10, 10)
            node p5: pin at (0, 10)
            arc w0: metal p0 -- p1 [rigid]
            arc w1: metal p1 -- p2 [rigid]
            arc w2: metal p2 -- p3 [rigid]
            arc w3: metal p3 -- p4 [rigid]
            arc w4: metal p4 -- p5 [rigid]
            arc w5: metal p5 -- p0 [rigid]
        }
    "#,
    )
    .unwrap();
    let before: Vec<Point> = (0..6)
        .map(|i| center(&design, &format!("p{}", i)))
        .collect();

    let p0 = node(&design, "p0");
    let mut engine = ConstraintEngine::new(PropagationConfig::default());
    let report = engine
        .modify_node(&mut design, p0, NodeDelta::translate(3.0, 4.0))
        .unwrap();

    assert_eq!(report.stats.node_visits, 6);
    assert_eq!(report.stats.nodes_altered, 6);
    for (i, old) in before.iter().enumerate() {
        assert_near(
            center(&design, &format!("p{}", i)),
            *old + Point::new(3.0, 4.0),
        );
    }
    assert!(check(&design).unwrap().is_empty());
}

#[test]
fn test_quarter_turn_swings_rigid_neighbour() {
    let mut design = load_design(
        r#"
        cell top {
            node n: gate
            node m: gate at (20, 0)
            arc w: metal n.a -- m.a [rigid]
        }
    "#,
    )
    .unwrap();

    edit(&mut design, "n", NodeDelta::rotate(900));

    let m = design.node(node(&design, "m")).unwrap();
    assert_near(m.geometry.center, Point::new(0.0, 20.0));
    assert_eq!(m.geometry.angle, 900);
    assert_eq!(design.node(node(&design, "n")).unwrap().geometry.angle, 900);

    let (head, tail) = arc_ends(&design, "w");
    assert_near(head, Point::new(0.0, 0.0));
    assert_near(tail, Point::new(0.0, 20.0));
    let w = design.find_arc(top(&design), "w").unwrap();
    assert_eq!(design.arc(w).unwrap().angle, 900);
}

#[test]
fn test_mirroring_reflects_rigid_neighbour() {
    let mut design = load_design(
        r#"
        cell top {
            node n: gate
            node m: gate at (20, 0)
            arc w: metal n.a -- m.a [rigid]
        }
    "#,
    )
    .unwrap();

    // Growing the width by -20 takes it from 10 to -10: a mirror about x
    edit(&mut design, "n", NodeDelta::resize(-20.0, 0.0));

    let n = design.node(node(&design, "n")).unwrap();
    assert!(n.geometry.flip_x());
    let m = design.node(node(&design, "m")).unwrap();
    assert_near(m.geometry.center, Point::new(-20.0, 0.0));
    assert_eq!(m.geometry.angle, 0);
    assert!(!m.geometry.flip_x());

    let (head, tail) = arc_ends(&design, "w");
    assert_near(tail - head, Point::new(-20.0, 0.0));
}

#[test]
fn test_locked_far_node_stays_put() {
    let mut design = load_design(
        r#"
        cell top {
            node a: pin
            node b: pin at (10, 0) [locked]
            arc w: metal a -- b [rigid]
        }
    "#,
    )
    .unwrap();

    edit(&mut design, "a", NodeDelta::translate(-5.0, 0.0));

    assert_near(center(&design, "b"), Point::new(10.0, 0.0));
    let (head, tail) = arc_ends(&design, "w");
    assert_near(head, Point::new(-5.0, 0.0));
    assert_near(tail, Point::new(10.0, 0.0));
}

#[test]
fn test_locked_primitive_respects_config() {
    let cells = r#"
        cell top {
            node a: pin
            node b: anchor at (10, 0)
            arc w: metal a -- b.a [rigid]
        }
    "#;

    let mut design = load_design(cells).unwrap();
    edit(&mut design, "a", NodeDelta::translate(0.0, 2.0));
    assert_near(center(&design, "b"), Point::new(10.0, 0.0));

    let mut design = load_design(cells).unwrap();
    let a = node(&design, "a");
    let mut engine =
        ConstraintEngine::new(PropagationConfig::new().with_move_locked_primitives(true));
    engine
        .modify_node(&mut design, a, NodeDelta::translate(0.0, 2.0))
        .unwrap();
    assert_near(center(&design, "b"), Point::new(10.0, 2.0));
}

#[test]
fn test_fixed_angle_arc_keeps_direction() {
    let mut design = load_design(
        r#"
        cell top {
            node a: pin
            node b: pin at (10, 0)
            arc w: metal a -- b [fixed_angle]
        }
    "#,
    )
    .unwrap();

    edit(&mut design, "a", NodeDelta::translate(0.0, 5.0));

    assert_near(center(&design, "b"), Point::new(10.0, 5.0));
    let (head, tail) = arc_ends(&design, "w");
    assert_near(head, Point::new(0.0, 5.0));
    assert_near(tail, Point::new(10.0, 5.0));
    assert!(check(&design).unwrap().is_empty());
}

#[test]
fn test_free_arc_stretches_without_moving_far_node() {
    let mut design = load_design(
        r#"
        cell top {
            node a: pin
            node b: pin at (10, 0)
            arc w: metal a -- b
        }
    "#,
    )
    .unwrap();

    edit(&mut design, "a", NodeDelta::translate(0.0, 5.0));

    assert_near(center(&design, "b"), Point::new(10.0, 0.0));
    let (head, tail) = arc_ends(&design, "w");
    assert_near(head, Point::new(0.0, 5.0));
    assert_near(tail, Point::new(10.0, 0.0));
    assert!(check(&design).unwrap().is_empty());
}

#[test]
fn test_vertical_fixed_angle_arc_drags_sideways() {
    let mut design = load_design(
        r#"
        cell top {
            node a: pin
            node b: pin at (0, 10)
            arc w: metal a -- b [fixed_angle]
        }
    "#,
    )
    .unwrap();

    edit(&mut design, "a", NodeDelta::translate(4.0, 1.0));

    // Only the horizontal component reaches the far node
    assert_near(center(&design, "b"), Point::new(4.0, 10.0));
    let (head, tail) = arc_ends(&design, "w");
    assert_near(head, Point::new(4.0, 1.0));
    assert_near(tail, Point::new(4.0, 10.0));
}

#[test]
fn test_chain_of_fixed_angle_arcs() {
    let mut design = load_design(
        r#"
        cell top {
            node a: pin
            node b: pin at (10, 0)
            node c: pin at (10, 10)
            arc h: metal a -- b [fixed_angle]
            arc v: metal b -- c [fixed_angle]
        }
    "#,
    )
    .unwrap();

    edit(&mut design, "a", NodeDelta::translate(0.0, 3.0));

    // b follows the horizontal arc up; the vertical arc just shortens
    assert_near(center(&design, "b"), Point::new(10.0, 3.0));
    assert_near(center(&design, "c"), Point::new(10.0, 10.0));
    assert!(check(&design).unwrap().is_empty());
}

#[test]
fn test_interior_arc_follows_its_node() {
    let mut design = load_design(
        r#"
        primitive pair [size: (10, 0)] {
            port l [lx: -0.5, hx: -0.5]
            port r [lx: 0.5, hx: 0.5]
        }
        cell top {
            node n: pair
            arc loop: metal n.l -- n.r
        }
    "#,
    )
    .unwrap();

    edit(&mut design, "n", NodeDelta::translate(2.0, 2.0));

    let (head, tail) = arc_ends(&design, "loop");
    assert_near(head, Point::new(-3.0, 2.0));
    assert_near(tail, Point::new(7.0, 2.0));
}

#[test]
fn test_interior_fixed_angle_arc_turns_with_its_node() {
    let mut design = load_design(
        r#"
        primitive pair [size: (10, 0)] {
            port l [lx: -0.5, hx: -0.5]
            port r [lx: 0.5, hx: 0.5]
        }
        cell top {
            node n: pair
            arc loop: metal n.l -- n.r [fixed_angle]
        }
    "#,
    )
    .unwrap();

    let report = edit(&mut design, "n", NodeDelta::rotate(900));

    assert_eq!(report.stats.jogs, 0);
    assert_eq!(report.stats.arc_moves, 1);
    assert_eq!(design.cell(top(&design)).unwrap().arcs.len(), 1);
    let (head, tail) = arc_ends(&design, "loop");
    assert_near(head, Point::new(0.0, -5.0));
    assert_near(tail, Point::new(0.0, 5.0));
    let id = design.find_arc(top(&design), "loop").unwrap();
    assert_eq!(design.arc(id).unwrap().angle, 900);
    assert!(check(&design).unwrap().is_empty());
}

#[test]
fn test_diagonal_arc_slides_far_node_along_its_other_arc() {
    let mut design = load_design(
        r#"
        cell top {
            node a: pin
            node b: pin at (10, 10)
            node c: pin at (30, 10)
            arc d: metal a -- b [fixed_angle]
            arc h: metal b -- c
        }
    "#,
    )
    .unwrap();

    edit(&mut design, "a", NodeDelta::translate(0.0, 5.0));

    // The 45 degree line from (0, 5) meets the horizontal through b at x = 5
    assert_near(center(&design, "b"), Point::new(5.0, 10.0));
    assert_near(center(&design, "c"), Point::new(30.0, 10.0));
    let (head, tail) = arc_ends(&design, "d");
    assert_near(head, Point::new(0.0, 5.0));
    assert_near(tail, Point::new(5.0, 10.0));
    let (head, tail) = arc_ends(&design, "h");
    assert_near(head, Point::new(5.0, 10.0));
    assert_near(tail, Point::new(30.0, 10.0));
    assert!(check(&design).unwrap().is_empty());
}

#[test]
fn test_diagonal_arc_with_parallel_neighbour_translates_far_node() {
    let mut design = load_design(
        r#"
        cell top {
            node a: pin
            node b: pin at (10, 10)
            node c: pin at (20, 20)
            arc d: metal a -- b [fixed_angle]
            arc e: metal b -- c
        }
    "#,
    )
    .unwrap();

    edit(&mut design, "a", NodeDelta::translate(0.0, 5.0));

    assert_near(center(&design, "b"), Point::new(10.0, 15.0));
    assert_near(center(&design, "c"), Point::new(20.0, 20.0));
    assert!(check(&design).unwrap().is_empty());
}

#[test]
fn test_lone_diagonal_arc_translates_far_node() {
    let mut design = load_design(
        r#"
        cell top {
            node a: pin
            node b: pin at (10, 10)
            arc d: metal a -- b [fixed_angle]
        }
    "#,
    )
    .unwrap();

    edit(&mut design, "a", NodeDelta::translate(3.0, 5.0));

    assert_near(center(&design, "b"), Point::new(13.0, 15.0));
    let id = design.find_arc(top(&design), "d").unwrap();
    assert_eq!(design.arc(id).unwrap().angle, 450);
}

#[test]
fn test_slidable_arc_stays_inside_wide_port() {
    let cells = r#"
        primitive bar [size: (20, 2)] { port s [lx: -0.5, hx: 0.5] }
        cell top {
            node a: bar
            node b: pin at (5, 10)
            arc w: metal a.s -- b [FLAG, head: (5, 0)]
        }
    "#;

    let mut design = load_design(&cells.replace("FLAG", "slidable")).unwrap();
    let report = edit(&mut design, "a", NodeDelta::translate(3.0, 0.0));
    assert_eq!(report.stats.arc_moves, 0);
    let (head, tail) = arc_ends(&design, "w");
    assert_near(head, Point::new(5.0, 0.0));
    assert_near(tail, Point::new(5.0, 10.0));
    assert!(check(&design).unwrap().is_empty());

    // Without the flag the end follows the node
    let mut design = load_design(&cells.replace("FLAG", "width: 1")).unwrap();
    let report = edit(&mut design, "a", NodeDelta::translate(3.0, 0.0));
    assert_eq!(report.stats.arc_moves, 1);
    let (head, _) = arc_ends(&design, "w");
    assert_near(head, Point::new(8.0, 0.0));
}

#[test]
fn test_arc_left_behind_by_later_drag_is_reconnected() {
    let mut design = load_design(
        r#"
        cell top {
            node a: pin
            node b: pin at (0, 10)
            node c: pin at (10, 0)
            arc r1: metal a -- b [rigid]
            arc r2: metal b -- c [rigid]
            arc f: metal a -- c
        }
    "#,
    )
    .unwrap();

    // f is stretched while visiting a; r2 moves c only afterwards
    let report = edit(&mut design, "a", NodeDelta::translate(0.0, 5.0));

    assert_eq!(report.stats.repairs, 1);
    assert_near(center(&design, "c"), Point::new(10.0, 5.0));
    let (head, tail) = arc_ends(&design, "f");
    assert_near(head, Point::new(0.0, 5.0));
    assert_near(tail, Point::new(10.0, 5.0));
    assert!(check(&design).unwrap().is_empty());
}

#[test]
fn test_fixed_angle_repair_runs_through_port_overlap() {
    let mut design = load_design(
        r#"
        primitive post [size: (0, 20)] { port s [ly: -0.5, hy: 0.5] }
        cell top {
            node a: pin
            node b: pin at (0, 10)
            node c: post at (10, 0)
            arc r1: metal a -- b [rigid]
            arc r2: metal b -- c.s [rigid]
            arc f: metal a -- c.s [fixed_angle]
        }
    "#,
    )
    .unwrap();

    // f first slides up c's tall port, then c is dragged out from under it
    let report = edit(&mut design, "a", NodeDelta::translate(3.0, 5.0));

    assert_eq!(report.stats.repairs, 1);
    assert_eq!(report.stats.jogs, 0);
    assert_near(center(&design, "c"), Point::new(13.0, 5.0));
    let (head, tail) = arc_ends(&design, "f");
    assert_near(head, Point::new(3.0, 5.0));
    assert_near(tail, Point::new(13.0, 5.0));
    assert!(check(&design).unwrap().is_empty());
}

#[test]
fn test_mirrored_turn_complements_rotation_of_opposite_hand_neighbour() {
    let cells = |far_mods: &str| {
        format!(
            r#"
            cell top {{
                node n: gate
                node m: gate at (20, 0) {far_mods}
                arc w: metal n.a -- m.a [rigid]
            }}
        "#
        )
    };
    // Mirror about x and turn a quarter: n ends at 2700 with odd parity
    let delta = NodeDelta::new(0.0, 0.0, -20.0, 0.0, 900);

    let mut design = load_design(&cells("[mirror_x]")).unwrap();
    edit(&mut design, "n", delta);
    let n = design.node(node(&design, "n")).unwrap().geometry;
    assert_eq!(n.angle, 2700);
    assert!(n.transposed());
    let m = design.node(node(&design, "m")).unwrap().geometry;
    assert_near(m.center, Point::new(0.0, 20.0));
    assert_eq!(m.angle, 900);

    let mut design = load_design(&cells("")).unwrap();
    edit(&mut design, "n", delta);
    let m = design.node(node(&design, "m")).unwrap().geometry;
    assert_near(m.center, Point::new(0.0, 20.0));
    assert_eq!(m.angle, 2700);
}
