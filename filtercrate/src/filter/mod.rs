// Feature Group 1: Filter Model
// Caller-built predicate trees and their operand values

pub mod ast;
pub mod value;

pub use ast::{BooleanOp, CompositeFilter, Filter, LeafFilter, LogicalOp, MAX_IN_LIST_SIZE, MatchMode};
pub use value::{EntityRef, FilterValue};
