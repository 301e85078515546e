//! DNS-related modules.

pub mod classifier;
pub mod codec;
pub mod pending;
pub mod relay;

pub use classifier::{Classifier, Rule, Verdict};
pub use codec::{DnsMessage, Header, MAX_MESSAGE_SIZE, decode_question_name, synthesize_nxdomain};
pub use pending::{PendingKey, PendingRelay};
pub use relay::{Relay, UdpRelay};
