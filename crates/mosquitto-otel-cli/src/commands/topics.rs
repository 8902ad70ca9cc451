use mosquitto_otel_core::{
    InstrumentKind, KNOWN_TOPICS, QUEUE_DEPTH_KEY, SYS_BASE, instrument_name,
};

pub fn run() {
    println!("{:<32} {:<34} INSTRUMENT", "TOPIC", "NAME");
    println!("{}", "-".repeat(90));
    for (suffix, kind) in KNOWN_TOPICS {
        println!(
            "{:<32} {:<34} {kind}",
            format!("{SYS_BASE}{suffix}"),
            instrument_name(suffix)
        );
    }
    println!();
    println!(
        "{:<32} {:<34} {}",
        "(msgctl MSG_STAT)",
        QUEUE_DEPTH_KEY,
        InstrumentKind::IntegerBidirectional
    );
    println!("{} topics", KNOWN_TOPICS.len());
}
