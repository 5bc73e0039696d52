//! Course-change log for the mobile source.

use std::{cell::RefCell, rc::Rc, time::Duration};

use spider_sim::{NodeId, SimWorld, SimulationResult, Vector3};
use tracing::info;

/// Records every position change of one node and reports it through
/// `tracing`.
#[derive(Debug, Clone, Default)]
pub struct CourseLog {
    entries: Rc<RefCell<Vec<(Duration, Vector3)>>>,
}

impl CourseLog {
    /// Starts following `node`.
    pub fn attach(world: &SimWorld, node: NodeId) -> SimulationResult<Self> {
        let log = Self::default();
        let entries = log.entries.clone();
        world.on_position_changed(node, move |_, position, time| {
            info!(
                "{}, Paramedic has changed location -> POS: ({}, {})",
                time.as_secs_f64(),
                position.x,
                position.y
            );
            entries.borrow_mut().push((time, position));
        })?;
        Ok(log)
    }

    /// Every `(time, position)` change seen so far.
    pub fn entries(&self) -> Vec<(Duration, Vector3)> {
        self.entries.borrow().clone()
    }
}
