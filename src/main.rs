use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use fcparam::{
    ParameterDescriptor, Session, SessionConfig,
    constants::{DEFAULT_DST, DEFAULT_SRC, DEFAULT_TABLES},
    transport::{Address, Baudrate, SerialTransport},
};

#[derive(Parser)]
#[command(
    name = "fcparam",
    about = "Read and write flight controller parameters over a DUML serial link"
)]
struct Cli {
    /// Serial port of the controller, the first one found when omitted
    #[arg(short, long, global = true)]
    port: Option<String>,

    #[arg(short, long, global = true, value_enum, default_value_t = Baudrate::default())]
    baudrate: Baudrate,

    /// Our address on the link, as 0xNN or KKII
    #[arg(long, global = true, default_value_t = Address::from_byte(DEFAULT_SRC))]
    src: Address,

    /// Flight controller address, as 0xNN or KKII
    #[arg(long, global = true, default_value_t = Address::from_byte(DEFAULT_DST))]
    dst: Address,

    /// Request timeout in milliseconds
    #[arg(long, global = true, default_value_t = 200)]
    timeout_ms: u64,

    /// Show status text pushed by the controller
    #[arg(short, long, global = true)]
    debug: bool,

    /// Log every frame on the wire
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List serial ports
    Ports {},
    /// Connect and print the controller version
    Info {},
    /// Print the number of items in a table
    Count { table: u16 },
    /// Print one parameter with its current value
    Get { table: u16, item: u16 },
    /// Write one parameter and read it back
    Set {
        table: u16,
        item: u16,
        /// New value, parsed according to the parameter type
        #[arg(allow_hyphen_values = true)]
        value: String,
    },
    /// Print every parameter of the given tables
    Dump {
        #[arg(short, long, value_delimiter = ',', default_values_t = DEFAULT_TABLES)]
        tables: Vec<u16>,
        #[arg(short, long, value_enum, default_value_t = DumpFormat::Text)]
        format: DumpFormat,
    },
    /// Show controller status text for a while, implies --debug
    Monitor {
        #[arg(default_value_t = 10)]
        seconds: u64,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum DumpFormat {
    Text,
    Json,
    Yaml,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        simplelog::LevelFilter::Debug
    } else {
        simplelog::LevelFilter::Info
    };
    let _ = simplelog::TermLogger::init(
        level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    match &cli.command {
        Commands::Ports {} => {
            for port in SerialTransport::scan_ports()? {
                println!("{}", port);
            }
        }
        Commands::Info {} => {
            let session = open_session(&cli)?;
            println!("{}", session.version());
        }
        Commands::Count { table } => {
            let items = open_session(&cli)?.query_table_item_count(*table)?;
            println!("Table {} => {} items", table, items);
        }
        Commands::Get { table, item } => {
            let mut session = open_session(&cli)?;
            let desc = session.fetch_descriptor(*table, *item)?;
            let desc = session.read_value(desc)?;
            println!("{}", desc);
        }
        Commands::Set { table, item, value } => {
            let mut session = open_session(&cli)?;
            let mut desc = session.fetch_descriptor(*table, *item)?;
            let value = desc.param_type().parse_value(value)?;
            session.write_value(&mut desc, value)?;
            let desc = session.read_value(desc)?;
            log::info!("{} = {}", desc.name(), value);
            println!("{}", desc);
        }
        Commands::Dump { tables, format } => {
            let all = open_session(&cli)?.dump_tables(tables)?;
            print_dump(&all, *format)?;
        }
        Commands::Monitor { seconds } => {
            open_session(&cli)?.poll(Duration::from_secs(*seconds))?;
        }
    }

    Ok(())
}

/// Open the serial link and complete the controller handshake.
fn open_session(cli: &Cli) -> Result<Session<SerialTransport>> {
    let config = SessionConfig {
        src: cli.src,
        dst: cli.dst,
        timeout: Duration::from_millis(cli.timeout_ms),
        debug: cli.debug || matches!(cli.command, Commands::Monitor { .. }),
    };
    let transport = match &cli.port {
        Some(port) => SerialTransport::open(port, cli.baudrate)?,
        None => SerialTransport::open_any(cli.baudrate)?,
    };
    Ok(Session::connect(transport, config)?)
}

fn print_dump(all: &[ParameterDescriptor], format: DumpFormat) -> Result<()> {
    match format {
        DumpFormat::Text => {
            for desc in all {
                println!("{}", desc);
            }
        }
        DumpFormat::Json => println!("{}", serde_json::to_string_pretty(all)?),
        DumpFormat::Yaml => print!("{}", serde_yaml::to_string(all)?),
    }
    Ok(())
}
