//! Target trajectory calculation
//!
//! Required emissions per year between a baseline and a target, phased by a
//! linear or pathway policy and split into months evenly or seasonally.

mod calculator;
mod types;

pub use calculator::TrajectoryCalculator;
pub use types::{
    MonthlyRequirement, MonthlySplit, Target, Trajectory, TrajectoryPolicy, YearlyRequirement,
};
