use std::time::Duration;

use ureq::{Agent, AgentBuilder};

pub fn agent() -> Agent {
    AgentBuilder::new()
        .user_agent(concat!("freebies/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(30))
        .build()
}
