pub const REMOTE_CONFIG: &'static str = include_str!("../remote.toml");

pub mod config;
pub mod failure_detector;
pub mod quarantine;
pub mod remote_watcher;
pub mod transport;

#[cfg(test)]
mod test {
    use tracing::Level;

    use membership_core::ext::init_logger;

    #[ctor::ctor]
    fn init() {
        init_logger(Level::DEBUG)
    }
}
