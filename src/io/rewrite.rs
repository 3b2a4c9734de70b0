//! Streaming template rewriting.
//!
//! A template document is copied element by element into a new file while a
//! [`RewriteHandler`] decides, for each opened element and the zone of the
//! document it falls in, whether to pass it through, override some of its
//! attributes, or replace it with freshly generated content.
pub mod close_stack;
pub mod engine;
pub mod location;
pub mod mzid;
pub mod report;

pub use close_stack::CloseStack;
pub use engine::{
    attribute_value, override_attributes, rewrite_file, HandlerAction, HandlerError,
    RewriteError, RewriteHandler, RewriteOutput, StreamingRewriter, XmlSink,
};
pub use location::{AncestorFlags, DocumentLocation, LocationTracker, MzIdLocation, ReportLocation};
pub use mzid::{MzIdContext, MzIdHandler};
pub use report::{ReportContext, ReportHandler};
