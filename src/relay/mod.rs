pub mod batches;
pub mod delivery;
pub mod http_client;
pub mod rate_limit;
pub mod submission;
pub mod summary;
pub mod telegram_client;

pub use batches::{chunk, partition_batches};
pub use delivery::{DeliveryState, Relay, RelaySettings};
pub use http_client::RelayHttpClient;
pub use rate_limit::{backoff_delay, classify, ApiOutcome, ApiReply};
pub use submission::{submit, RelayTarget, SubmissionPolicy, SubmissionReport};
pub use summary::{build_summary_message, escape_md};
pub use telegram_client::{MediaGroupUpload, MessagingApi, TelegramClient, TextMessage};
