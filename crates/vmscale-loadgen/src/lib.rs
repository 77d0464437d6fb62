//! vmscale-loadgen: client for the external load-generator service.
//!
//! ```text
//! GET /test/horizontal?dns=<ws>       start horizontal test → "name=<id>.log"
//! GET /test/horizontal/add?dns=<ws>   add a worker mid-test (200 = accepted)
//! GET /autoscaling?dns=<lb>           start auto-scaling test
//! GET /warmup?dns=<lb>                start warmup
//! GET /log?name=<id>                  INI-like progress log
//! ```
//!
//! [`TestSessionDriver`] wraps these calls; all text extraction lives in
//! [`log_doc`] so response-format quirks stay at this boundary.

pub mod driver;
pub mod error;
pub mod log_doc;
pub mod sim;
pub mod transport;

pub use driver::{PollResult, Submission, TestKind, TestSession, TestSessionDriver};
pub use error::{LoadGenError, LoadGenResult};
pub use log_doc::{LogDocument, extract_test_id};
pub use sim::SimLoadGenerator;
pub use transport::{HttpReply, HyperTransport, LoadGenTransport};
