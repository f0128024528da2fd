// Domain layer: run-state model and ports (connect, sleep, run command, task).

pub mod model;
pub mod ports;
