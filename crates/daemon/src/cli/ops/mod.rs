pub mod exchange;
pub mod health;
pub mod identity;
pub mod init;
pub mod messages;
pub mod serve;
pub mod version;

pub use exchange::Exchange;
pub use health::Health;
pub use identity::Identity;
pub use init::Init;
pub use messages::Messages;
pub use serve::Serve;
pub use version::Version;
