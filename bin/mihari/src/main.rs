use std::collections::HashMap;

use anyhow::bail;
use clap::Parser;
use mihari::Prober;
use tracing_subscriber::filter::LevelFilter;

#[derive(Parser, Debug)]
#[clap(version, author, about = "Live-stream quality prober")]
struct MihariArgs {
    /// Live stream URL (.flv or .m3u8 over http/https)
    url: String,

    /// Player jitter buffer in milliseconds (clamped to 30000)
    #[clap(long, default_value = "1000")]
    buffer_time: u32,

    /// Probe window in seconds
    #[clap(long, default_value = "10")]
    probe_time: u32,

    /// Custom header, e.g. "Referer: https://example.com". May be repeated.
    #[clap(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Print the report as JSON
    #[clap(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = MihariArgs::parse();

    let mut header = HashMap::new();
    for entry in &args.headers {
        let Some((key, value)) = entry.split_once(':') else {
            bail!("invalid header: {entry}");
        };
        header.insert(key.trim().to_string(), value.trim().to_string());
    }

    let prober = Prober {
        url: args.url,
        player_buffer_time_ms: args.buffer_time,
        probe_time_sec: args.probe_time,
        header,
    };
    let info = prober.probe().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("connected:        {}", info.is_connected);
    println!("http code:        {}", info.http_code);
    if info.err_code != 0 {
        println!("error code:       {}", info.err_code);
    }
    println!("remote addr:      {}", info.remote_addr);
    println!("local addr:       {}", info.local_addr);
    println!("dns:              {} ms", info.dns_time_ms);
    println!("tcp connect:      {} ms", info.tcp_connect_time_ms);
    println!("tls handshake:    {} ms", info.tls_handshake_time_ms);
    println!("ttfb:             {} ms", info.ttfb_ms);
    println!("first video pkt:  {} ms", info.first_video_pkt_time_ms);
    println!("first audio pkt:  {} ms", info.first_audio_pkt_time_ms);
    println!("video fps:        {:.2}", info.video_fps);
    println!("lag count:        {}", info.total_lag_count);
    println!("lag time:         {} ms", info.total_lag_time_ms);
    println!("lag rate:         {:.4}", info.lag_rate);

    Ok(())
}
