//! Frame header exchanged before every request and response body.

use serde::{Deserialize, Serialize};

/// Sequence number chosen by the client. `0` is never assigned to a real call.
pub type Seq = u64;

/// Header of one request or response frame.
///
/// # Fields
///
/// - `service_method`: target in `"Service.Method"` form
/// - `seq`: request sequence number, echoed back in the response
/// - `error`: empty on requests; set by the server when the call failed
///
/// The body that follows is a separate frame whose type depends on the
/// direction: the call argument on the way in, the reply (or an empty
/// placeholder when `error` is set) on the way out.
///
/// # Example
///
/// ```
/// use minirpc_common::protocol::Header;
///
/// let header = Header::request("Foo.Sum", 1);
/// assert!(header.is_ok());
/// assert_eq!(header.service_method, "Foo.Sum");
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Header {
    pub service_method: String,
    pub seq: Seq,
    pub error: String,
}

impl Header {
    /// Builds a request header with an empty error.
    pub fn request(service_method: impl Into<String>, seq: Seq) -> Self {
        Header {
            service_method: service_method.into(),
            seq,
            error: String::new(),
        }
    }

    /// Overwrites every field so a reused header never carries stale data.
    pub fn reset(&mut self, service_method: &str, seq: Seq) {
        self.service_method.clear();
        self.service_method.push_str(service_method);
        self.seq = seq;
        self.error.clear();
    }

    /// Whether the response carries no error.
    pub fn is_ok(&self) -> bool {
        self.error.is_empty()
    }
}

/// Splits `"Service.Method"` at the last dot.
pub fn split_service_method(service_method: &str) -> Option<(&str, &str)> {
    service_method.rsplit_once('.')
}
