use std::{
    error::Error,
    io::{self, Write},
    process,
    sync::Arc,
    time::Duration,
};

use clap::Parser;
use tarn::{
    Client, ClientOptions, DataResponse, Value,
    cli::{Command, PromptError, prompt},
};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Connection string: `host:port`, `user:password@host:port`, or a comma-separated list
    connection: String,
    /// Keep-alive interval in milliseconds; 0 disables it, negative keeps the default
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    ping_interval: i64,
    /// Connect timeout in milliseconds
    #[arg(long, default_value_t = 1000)]
    connect_timeout_ms: u64,
    /// Give up waiting for a response after this many milliseconds
    #[arg(long)]
    request_timeout_ms: Option<u64>,
}

fn main() -> Result<(), Box<dyn Error>> {
    // Initialize env_logger; For logging to STDOUT/STDERR
    env_logger::init();

    let cli = Cli::parse();
    let mut options = ClientOptions::new(&cli.connection)?
        .with_ping_check_interval(cli.ping_interval)
        .with_connect_timeout(Duration::from_millis(cli.connect_timeout_ms));
    if let Some(ms) = cli.request_timeout_ms {
        options = options.with_request_timeout(Duration::from_millis(ms));
    }

    let client = Arc::new(Client::new(options));
    {
        let client = Arc::clone(&client);
        ctrlc::set_handler(move || {
            client.dispose();
            process::exit(130);
        })?;
    }

    if let Err(e) = client.connect() {
        eprintln!("connect error: {e}");
    }

    let stdin = io::stdin();
    let stdout = io::stdout();
    loop {
        let cmd = match prompt(stdin.lock(), stdout.lock()) {
            Ok(cmd) => cmd,
            Err(PromptError::Io(e)) => return Err(e.into()),
            Err(e) => {
                eprintln!("error: {e}");
                continue;
            }
        };

        let res = match cmd {
            Command::Exit => break,
            Command::Status => {
                println!("{:?}", client.connection().state());
                continue;
            }
            Command::Ping => client.ping().map(|_| println!("pong")),
            Command::Call { function, args } => client.call(&function, args).map(print_data),
            Command::Eval(expression) => client.eval(&expression, ()).map(print_data),
        };

        if let Err(e) = res {
            eprintln!("request error: {e}");
        }
    }

    client.dispose();
    io::stdout().flush()?;
    Ok(())
}

fn print_data(response: DataResponse<Value>) {
    if response.data.is_empty() {
        println!("---");
    }
    for value in response.data {
        println!("- {value}");
    }
}
