//! Connectivity lint
//!
//! Runs after propagation and reports arcs that no longer do what the
//! design says they do: an end lying outside its port, or a fixed-angle
//! arc whose direction differs from its recorded angle.

use std::fmt;

use crate::design::{angle_of, ArcEnd, ArcId, Design, DesignError};
use crate::dump::format_number;

/// A problem found in the design
#[derive(Debug, Clone, PartialEq)]
pub struct Defect {
    pub category: DefectCategory,
    pub arc: ArcId,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefectCategory {
    /// An arc end is not on its port
    Disconnected,
    /// A fixed-angle arc points the wrong way
    AngleDrift,
}

impl fmt::Display for DefectCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefectCategory::Disconnected => write!(f, "disconnected"),
            DefectCategory::AngleDrift => write!(f, "angle"),
        }
    }
}

impl fmt::Display for Defect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.category, self.message)
    }
}

/// Check every arc in every cell
pub fn check(design: &Design) -> Result<Vec<Defect>, DesignError> {
    let tolerance = design.tolerance();
    let mut defects = Vec::new();
    for cell in design.cell_ids() {
        for &id in &design.cell(cell)?.arcs {
            let arc = design.arc(id)?;
            for end in [ArcEnd::Head, ArcEnd::Tail] {
                let e = arc.end(end);
                let polygon = design.port_polygon(e.node, e.port)?;
                if !polygon.contains(e.location, tolerance) {
                    defects.push(Defect {
                        category: DefectCategory::Disconnected,
                        arc: id,
                        message: format!(
                            "{}: {} at ({}, {}) is off port {}.{}",
                            design.describe_arc(id),
                            end,
                            format_number(e.location.x),
                            format_number(e.location.y),
                            design.node(e.node)?.name,
                            design.port_name(e.node, e.port)?
                        ),
                    });
                }
            }

            let vector = arc.tail().location - arc.head().location;
            if arc.fixed_angle && vector.length() > tolerance {
                let actual = angle_of(vector);
                if actual % 1800 != arc.angle % 1800 {
                    defects.push(Defect {
                        category: DefectCategory::AngleDrift,
                        arc: id,
                        message: format!(
                            "{}: runs at {} but is fixed at {}",
                            design.describe_arc(id),
                            actual,
                            arc.angle
                        ),
                    });
                }
            }
        }
    }
    defects.sort_by(|a, b| a.message.cmp(&b.message));
    Ok(defects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::Point;
    use crate::loader::load;
    use crate::parser::parse;

    fn design(src: &str) -> Design {
        load(&parse(src).expect("Should parse")).expect("Should load").design
    }

    const SRC: &str = "
        primitive pin [pin] { port p }
        arcproto metal [width: 1]
        cell top {
            node a: pin
            node b: pin at (10, 0)
            arc w: metal a -- b [fixed_angle]
        }
    ";

    #[test]
    fn test_clean_design_has_no_defects() {
        assert!(check(&design(SRC)).unwrap().is_empty());
    }

    #[test]
    fn test_detached_end_reported() {
        let mut d = design(SRC);
        let top = d.find_cell("top").unwrap();
        let b = d.find_node(top, "b").unwrap();
        let mut geometry = d.node(b).unwrap().geometry;
        geometry.center = Point::new(10.0, 3.0);
        d.set_node_geometry(b, geometry).unwrap();

        let defects = check(&d).unwrap();
        assert_eq!(defects.len(), 1);
        assert_eq!(defects[0].category, DefectCategory::Disconnected);
        assert_eq!(defects[0].to_string(), "[disconnected] top:w: tail at (10, 0) is off port b.p");
    }

    #[test]
    fn test_angle_drift_reported() {
        let mut d = design(SRC);
        let top = d.find_cell("top").unwrap();
        let w = d.find_arc(top, "w").unwrap();
        d.arc_mut(w).unwrap().angle = 900;
        let defects = check(&d).unwrap();
        assert_eq!(defects.len(), 1);
        assert_eq!(defects[0].category, DefectCategory::AngleDrift);
    }
}
