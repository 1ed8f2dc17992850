//! タブローモニタ - 推論イベントの観測フック

use crate::graph::NodeId;
use std::time::Instant;
use tracing::debug;

/// Observer of the major events of a satisfiability check. All methods
/// default to no-ops; implementations must not assume any particular
/// event ordering beyond started/finished bracketing a check.
pub trait TableauMonitor {
    fn satisfiability_started(&mut self) {}
    fn satisfiability_finished(&mut self, _satisfiable: bool) {}
    fn node_created(&mut self, _node: NodeId) {}
    fn branch_point_pushed(&mut self, _level: usize) {}
    fn clash_detected(&mut self) {}
    fn backtrack_performed(&mut self, _level: usize) {}
}

/// Forwards every event to two monitors in order.
pub struct MonitorFork {
    first: Box<dyn TableauMonitor>,
    second: Box<dyn TableauMonitor>,
}

impl MonitorFork {
    pub fn new(first: Box<dyn TableauMonitor>, second: Box<dyn TableauMonitor>) -> Self {
        MonitorFork { first, second }
    }
}

impl TableauMonitor for MonitorFork {
    fn satisfiability_started(&mut self) {
        self.first.satisfiability_started();
        self.second.satisfiability_started();
    }

    fn satisfiability_finished(&mut self, satisfiable: bool) {
        self.first.satisfiability_finished(satisfiable);
        self.second.satisfiability_finished(satisfiable);
    }

    fn node_created(&mut self, node: NodeId) {
        self.first.node_created(node);
        self.second.node_created(node);
    }

    fn branch_point_pushed(&mut self, level: usize) {
        self.first.branch_point_pushed(level);
        self.second.branch_point_pushed(level);
    }

    fn clash_detected(&mut self) {
        self.first.clash_detected();
        self.second.clash_detected();
    }

    fn backtrack_performed(&mut self, level: usize) {
        self.first.backtrack_performed(level);
        self.second.backtrack_performed(level);
    }
}

/// Counts nodes, branch points, clashes, and backtracks per check and
/// logs them with the elapsed time through `tracing` when the check
/// finishes.
#[derive(Debug, Default)]
pub struct TimingMonitor {
    started: Option<Instant>,
    nodes: u64,
    branch_points: u64,
    clashes: u64,
    backtracks: u64,
}

impl TimingMonitor {
    pub fn new() -> Self {
        TimingMonitor::default()
    }
}

impl TableauMonitor for TimingMonitor {
    fn satisfiability_started(&mut self) {
        self.started = Some(Instant::now());
        self.nodes = 0;
        self.branch_points = 0;
        self.clashes = 0;
        self.backtracks = 0;
    }

    fn satisfiability_finished(&mut self, satisfiable: bool) {
        let elapsed = self.started.take().map(|s| s.elapsed());
        debug!(
            satisfiable,
            nodes = self.nodes,
            branch_points = self.branch_points,
            clashes = self.clashes,
            backtracks = self.backtracks,
            elapsed_us = elapsed.map(|e| e.as_micros() as u64).unwrap_or(0),
            "satisfiability check finished"
        );
    }

    fn node_created(&mut self, _node: NodeId) {
        self.nodes += 1;
    }

    fn branch_point_pushed(&mut self, _level: usize) {
        self.branch_points += 1;
    }

    fn clash_detected(&mut self) {
        self.clashes += 1;
    }

    fn backtrack_performed(&mut self, _level: usize) {
        self.backtracks += 1;
    }
}
