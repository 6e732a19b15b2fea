use std::time::{Duration, Instant};
use rand::{seq::SliceRandom, thread_rng};
use hdrhistogram::Histogram;
use sentinel_chat::client;


// Replays chat messages against a running server, one connection at a time (the server is
// sequential), and reports time-to-first-text and full-turn latency.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let addr = std::env::args().nth(1).unwrap_or_else(|| "127.0.0.1:6006".to_string());
    let total: usize = std::env::args().nth(2).map(|s| s.parse()).transpose()?.unwrap_or(50);
    let messages = vec!["hello", "tell me a joke", "what is rust?", "summarize our chat", "thanks", "你好"];

    let mut first_text = Histogram::<u64>::new(3)?;
    let mut full_turn = Histogram::<u64>::new(3)?;
    let mut errors = 0usize;
    let mut chars = 0usize;

    let start = Instant::now();
    for _ in 0..total {
        let msg = {
            let mut rng = thread_rng();
            messages.choose(&mut rng).unwrap().to_string()
        };
        let t0 = Instant::now();
        let mut first: Option<Duration> = None;
        let res = client::exchange(addr.as_str(), &msg, |_| {
            first.get_or_insert_with(|| t0.elapsed());
        })
        .await;
        match res {
            Ok(reply) => {
                chars += reply.chars().count();
                full_turn.record(t0.elapsed().as_millis() as u64).ok();
                if let Some(d) = first { first_text.record(d.as_millis() as u64).ok(); }
            }
            Err(e) => { eprintln!("turn failed: {e}"); errors += 1; }
        }
    }

    // keep the server's window small between runs
    client::exchange(addr.as_str(), sentinel_chat::protocol::CLEAR_HISTORY, |_| {}).await?;

    println!("ran {} turns in {:?} ({} chars)", total, start.elapsed(), chars);
    println!("errors: {}", errors);
    for (name, hist) in [("first text", &first_text), ("full turn", &full_turn)] {
        println!("{name}: p50 {} ms, p95 {} ms, p99 {} ms",
            hist.value_at_quantile(0.50), hist.value_at_quantile(0.95), hist.value_at_quantile(0.99));
    }
    Ok(())
}
