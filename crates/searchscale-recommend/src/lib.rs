//! searchscale-recommend — turns policy rules and stored node metrics into
//! scaling recommendations.
//!
//! # Rule Evaluation
//!
//! ```text
//! samples = metric samples with epoch >= now - decision_period
//!
//! avg | min | max:  stat over every sample's metric value
//! count:            number of samples beyond the limit
//!
//! scale_up_by_<n>:    fires when stat > limit   (count: >= occurrences)
//! scale_down_by_<n>:  fires when stat < limit   (count: >= occurrences)
//!
//! operator = "and":  every rule fires
//! operator = "or":   any rule fires
//! ```
//!
//! A rule with no samples in its window never fires. Recommendations are
//! returned in policy order; the first one has the highest priority.

pub mod recommender;

pub use recommender::Recommender;
