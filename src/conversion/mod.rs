//! Text conversion
//!
//! - Key-position conversion between layouts
//! - Retype vs. selection mode policy
//! - Selection read/convert/replace protocol
//! - Correction learning and the learned dictionary

pub mod correction;
pub mod dictionary;
pub mod keymap;
pub mod policy;
pub mod selection;

pub use correction::AutoConvertMarker;
pub use dictionary::{AutoConvertDetector, FileDictionary, LearnedDetector, SharedDictionary};
pub use keymap::{KeymapConverter, TextConverter};
pub use policy::{ConversionMode, ConversionPolicy, ModePolicy, WindowInspector};
pub use selection::{SelectionError, SelectionProtocol, SelectionService};
