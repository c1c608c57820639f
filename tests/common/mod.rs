#![allow(dead_code)]

use lifeline::testing::ScriptedTransport;
use lifeline::{ClientConfig, ClientConfigBuilder, ManualClock, RpcClient, TrackingSleeper};

pub const A: &str = "https://a.example";
pub const B: &str = "https://b.example";
pub const C: &str = "https://c.example";

/// A client wired to scripted collaborators, plus handles to drive them.
pub struct Harness {
    pub client: RpcClient,
    pub transport: ScriptedTransport,
    pub clock: ManualClock,
    pub sleeper: TrackingSleeper,
}

pub fn config(urls: &[&str]) -> ClientConfigBuilder {
    ClientConfig::builder().endpoints(urls.iter().copied())
}

pub fn harness(builder: ClientConfigBuilder) -> Harness {
    let transport = ScriptedTransport::new();
    let clock = ManualClock::new();
    let sleeper = TrackingSleeper::new();
    let client = RpcClient::builder(builder.build().expect("valid config"), transport.clone())
        .with_clock(clock.clone())
        .with_sleeper(sleeper.clone())
        .build()
        .expect("valid client");
    Harness { client, transport, clock, sleeper }
}
