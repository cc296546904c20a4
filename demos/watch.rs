use std::io::BufRead;
use std::time::Duration;

use clap::Parser;
use mailwatch::{ConfigBuilder, Session, TlsMode};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Print every new message that lands in a folder", long_about = None)]
struct Args {
    /// IMAP server to connect to
    #[arg(short, long, env = "IMAP_SERVER")]
    server: String,

    /// Port to connect to
    #[arg(long, env = "IMAP_PORT", default_value_t = 993)]
    port: u16,

    /// User name to log in with
    #[arg(short, long, env = "IMAP_USERNAME")]
    username: String,

    /// Password to log in with
    #[arg(short, long, env = "IMAP_PASSWORD", hide_env_values = true)]
    password: String,

    /// Folder to watch
    #[arg(short, long, env = "IMAP_FOLDER", default_value = "INBOX")]
    folder: String,

    /// Use STARTTLS on a plaintext port instead of implicit TLS
    #[arg(long)]
    starttls: bool,

    /// Seconds to stay in one IDLE before renewing it
    #[arg(long, default_value_t = 300)]
    idle_refresh: u64,
}

fn main() {
    // a .env file next to the binary is fine too
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = ConfigBuilder::new(args.server, args.username, args.password)
        .port(args.port)
        .folder(args.folder)
        .tls_mode(if args.starttls {
            TlsMode::StartTls
        } else {
            TlsMode::Tls
        })
        .idle_refresh(Duration::from_secs(args.idle_refresh))
        .build();

    let mut session = Session::new(config);
    if let Err(e) = session.connect() {
        eprintln!("could not connect: {}", e);
        std::process::exit(1);
    }

    let watch = match session.wait_for_messages() {
        Ok(watch) => watch,
        Err(e) => {
            eprintln!("could not start watching: {}", e);
            std::process::exit(1);
        }
    };

    let canceller = watch.canceller();
    std::thread::spawn(move || {
        println!("watching, press enter to stop");
        let mut line = String::new();
        let _ = std::io::stdin().lock().read_line(&mut line);
        canceller.cancel();
    });

    for message in watch.messages() {
        println!("-----");
        println!("From:    {}", message.from().unwrap_or_default());
        println!("Subject: {}", message.subject().unwrap_or_default());
        match message.plain_text() {
            Ok(text) => println!("\n{}", text.trim_end()),
            Err(e) => println!("\n({})", e),
        }
    }

    match watch.done().recv() {
        Ok(Ok(())) => println!("stopped"),
        Ok(Err(e)) => eprintln!("watch failed: {}", e),
        Err(_) => eprintln!("watch thread went away"),
    }
    session.disconnect();
}
