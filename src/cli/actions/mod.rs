pub mod server;

use crate::config::Settings;

#[derive(Clone, Debug)]
pub enum Action {
    Server { port: u16, settings: Settings },
}
