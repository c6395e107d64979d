/// SQL text helpers: identifier quoting, filter compilation and join parsing.
pub mod filter;
pub mod ident;
pub mod join;

pub use filter::{CompiledFilter, Filter, FilterCompiler, PrimaryKeySource};
pub use ident::{validate_name, IdentifierQuoter};
pub use join::{JoinKind, JoinSpec};
