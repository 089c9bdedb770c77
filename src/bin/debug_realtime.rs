/// Realtime Debug Tool - step-by-step stream diagnostics
///
/// Walks through everything a dashboard stream needs:
/// - Loads the configuration and the stored session token
/// - Opens the requested stream through the regular channel code
/// - Counts envelopes, malformed frames are visible with --debug-realtime
/// - Reports reconnects and the final channel status
///
/// Usage:
///   cargo run --bin debug_realtime
///   cargo run --bin debug_realtime -- --stream prices --symbols BTC,ETH
///   cargo run --bin debug_realtime -- --stream signals --duration 120 --debug-realtime
use cryptopilot::{
    arguments::{has_arg, patterns},
    config,
    logger,
    realtime::{ChannelHandlers, ChannelState, RealtimeManager, StreamKind},
    storage::{FileStore, SessionStore, TokenSource},
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{timeout, Duration};

fn print_header(title: &str) {
    println!("\n{}", "=".repeat(80));
    println!("  {}", title);
    println!("{}\n", "=".repeat(80));
}

fn print_step(step: &str, status: &str) {
    let marker = match status {
        "SUCCESS" => "[ok]",
        "RUNNING" => "[..]",
        "ERROR" => "[!!]",
        "WARNING" => "[??]",
        _ => "[--]",
    };
    if status == "RUNNING" || status == "INFO" {
        println!("{} {}", marker, step);
    } else {
        println!("{} {} - {}", marker, step, status);
    }
}

#[tokio::main]
async fn main() {
    logger::init_console();

    if has_arg("--help") {
        println!("Usage: cargo run --bin debug_realtime [OPTIONS]\n");
        println!("Options:");
        println!("  --stream <name>        portfolio, market, signals or prices (default: market)");
        println!("  --symbols <list>       Symbols for the prices stream (default: BTC,ETH)");
        println!("  --duration <seconds>   How long to listen (default: 30)");
        println!("  --debug-realtime       Log every channel transition");
        return;
    }

    print_header("REALTIME DEBUG TOOL - STREAM DIAGNOSTICS");

    let duration = patterns::get_duration_seconds().unwrap_or(30);
    let stream_name = patterns::get_stream().unwrap_or_else(|| "market".to_string());
    let mut symbols = patterns::get_symbols();
    if symbols.is_empty() {
        symbols = vec!["BTC".to_string(), "ETH".to_string()];
    }

    let stream = match StreamKind::from_name(&stream_name, symbols) {
        Some(stream) => stream,
        None => {
            print_step(&format!("Unknown stream '{}'", stream_name), "ERROR");
            return;
        }
    };

    // Step 1: configuration
    print_step("Loading configuration", "RUNNING");
    if let Some(path) = config::default_config_path() {
        if let Err(e) = config::load_config_from_path(&path) {
            print_step(&format!("Failed to load config: {}", e), "ERROR");
            return;
        }
    }
    let cfg = config::get_config_clone();
    print_step(&format!("WebSocket base: {}", cfg.api.ws_base_url), "INFO");
    print_step(
        &format!(
            "Reconnect policy: {} attempts, {}ms apart",
            cfg.realtime.max_reconnect_attempts, cfg.realtime.reconnect_delay_ms
        ),
        "INFO",
    );

    // Step 2: token
    print_header("STEP 1: SESSION TOKEN");
    let store_path = if cfg.storage.path.is_empty() {
        FileStore::default_path()
    } else {
        Some(cfg.storage.path.clone().into())
    };
    let store = match store_path.map(FileStore::open) {
        Some(Ok(store)) => SessionStore::new(Arc::new(store)),
        Some(Err(e)) => {
            print_step(&format!("Cannot open session store: {}", e), "ERROR");
            return;
        }
        None => {
            print_step("No data directory for the session store", "ERROR");
            return;
        }
    };
    if store.access_token().is_none() {
        print_step("No stored token", "ERROR");
        println!("\n   Log in first: cargo run -- login --email <email>");
        return;
    }
    print_step("Token found", "SUCCESS");

    // Step 3: connect and listen
    print_header(&format!("STEP 2: LISTENING ON {}", stream.path()));

    let messages = Arc::new(AtomicUsize::new(0));
    let disconnects = Arc::new(AtomicUsize::new(0));
    let errors = Arc::new(AtomicUsize::new(0));
    let kinds = Arc::new(parking_lot::Mutex::new(BTreeMap::<String, usize>::new()));

    let handlers = {
        let messages = Arc::clone(&messages);
        let disconnects = Arc::clone(&disconnects);
        let errors = Arc::clone(&errors);
        let kinds = Arc::clone(&kinds);
        ChannelHandlers::new()
            .on_connect(|| print_step("Connection open", "SUCCESS"))
            .on_disconnect(move |reason| {
                disconnects.fetch_add(1, Ordering::SeqCst);
                print_step(&format!("Connection closed: {}", reason), "WARNING");
            })
            .on_error(move |e| {
                errors.fetch_add(1, Ordering::SeqCst);
                print_step(&format!("Transport error: {}", e), "ERROR");
            })
            .on_message(move |envelope| {
                messages.fetch_add(1, Ordering::SeqCst);
                *kinds.lock().entry(envelope.kind.clone()).or_insert(0) += 1;
            })
    };

    let realtime = RealtimeManager::with_tungstenite(&cfg.api, cfg.realtime.clone(), Arc::new(store));
    let channel = realtime.channel(&stream, handlers);

    let started = Instant::now();
    if let Err(e) = channel.connect().await {
        print_step(&format!("Connect refused: {}", e), "ERROR");
        return;
    }

    let mut status = channel.subscribe();
    let listen = async {
        loop {
            if status.changed().await.is_err() {
                break;
            }
            if status.borrow_and_update().exhausted {
                break;
            }
        }
    };
    let _ = timeout(Duration::from_secs(duration), listen).await;

    // Summary
    let final_status = channel.status();
    channel.disconnect();

    print_header("SUMMARY");
    println!("   Listened:     {:.1}s", started.elapsed().as_secs_f64());
    println!("   Envelopes:    {}", messages.load(Ordering::SeqCst));
    println!("   Disconnects:  {}", disconnects.load(Ordering::SeqCst));
    println!("   Errors:       {}", errors.load(Ordering::SeqCst));
    for (kind, count) in kinds.lock().iter() {
        println!("     {:<20} {}", kind, count);
    }
    match final_status.state {
        ChannelState::Open => print_step("Stream healthy at exit", "SUCCESS"),
        _ if final_status.exhausted => print_step(
            &format!("Stream gave up: {}", final_status.error.unwrap_or_default()),
            "ERROR",
        ),
        state => print_step(&format!("Stream ended in state {:?}", state), "WARNING"),
    }
    logger::flush();
}
