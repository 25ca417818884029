pub mod base;
pub mod communities;
pub mod community;
pub mod detector;
pub mod dump;
pub mod error;
pub mod graph_gen;
pub mod hypernode;
pub mod io;
pub mod order;
pub mod provenance;
pub mod quality;
pub mod utils;

pub use base::*;
pub use detector::{detect, detect_many, detect_with_ordering, Detection, DetectionConfig};
pub use error::{CommunityError, Result};
