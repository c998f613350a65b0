pub mod scope_view;

pub use scope_view::{render_status, ScopeView};
