pub mod applier;
pub mod dom;
pub mod epoch;
pub mod locator;
pub mod page;
pub mod request;
pub mod resolver;
pub mod scheduler;
pub mod session;
pub mod splitter;
pub mod symbols;
pub mod views;

// Re-export key types for easier usage
pub use applier::{ANNOTATION_ATTR, Annotation, annotate};
pub use dom::{Document, DomError, NodeId};
pub use epoch::{Epoch, EpochTracker};
pub use locator::{DiffSide, FileCache};
pub use request::{RequestError, ResolveRequest, StampedRequest};
pub use resolver::{HttpResolver, ResolveError, Resolver};
pub use scheduler::{BatchScheduler, SLICE_SIZE, SliceOutcome};
pub use session::{AnnotationSession, ApplyReport, ReceiveOutcome};
pub use symbols::{DiffSymbols, Envelope, FileSymbols, ResolutionResult, Symbol, SymbolList};
