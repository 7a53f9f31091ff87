//
// reference/mod.rs
//
// Reference indexing for linked document corpora
//

pub mod collect;
pub mod config;
pub mod conflict;
pub mod detector;
pub mod engine;
pub mod error;
pub mod fs_source;
pub mod index;
pub mod markdown;
pub mod policy;
pub mod provider;
pub mod source;
pub mod stem;
pub mod supersede;
pub mod types;
pub mod view;



pub use collect::*;
pub use config::*;
pub use conflict::*;
pub use detector::*;
pub use engine::*;
pub use error::*;
pub use fs_source::*;
pub use index::*;
pub use policy::*;
pub use provider::*;
pub use source::*;
pub use supersede::*;
pub use types::*;
pub use view::*;
