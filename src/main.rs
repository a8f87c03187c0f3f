use anyhow::{bail, Context};
use autolevel::{
    format_height_table, init_logging, list_ports, Config, LevelingJob, Pipeline, SerialTransport,
};
use clap::{CommandFactory, Parser};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

const LONG_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (built ", env!("BUILD_DATE"), ")");

const AFTER_HELP: &str = "\
Shapes:
  autolevel                               prompt for the area, probe it
  autolevel -p WIDTH HEIGHT [DX DY]       probe only
  autolevel -f FILE WIDTH HEIGHT [DX DY DEPTH]
                                          probe, then level FILE
  autolevel -l LOG FILE [DEPTH]           level FILE from a saved height log

WIDTH, HEIGHT  size of the area to probe (mm)
DX, DY         probe spacing, defaults from the config (-10, 10)
DEPTH          cut depth below the probed surface (mm)";

#[derive(Parser, Debug)]
#[command(name = "autolevel")]
#[command(about = "Probe a board with a GRBL controller and level G-code to its surface")]
#[command(version = LONG_VERSION)]
#[command(after_help = AFTER_HELP)]
struct Cli {
    /// Probe an area: WIDTH HEIGHT [DX DY]
    #[arg(
        short = 'p',
        num_args = 2..=4,
        value_names = ["WIDTH", "HEIGHT", "DX", "DY"],
        allow_negative_numbers = true,
        conflicts_with_all = ["file", "from_log"]
    )]
    probe: Option<Vec<f64>>,

    /// Probe an area and level a file: FILE WIDTH HEIGHT [DX DY DEPTH]
    #[arg(
        short = 'f',
        num_args = 3..=6,
        value_names = ["FILE", "WIDTH", "HEIGHT", "DX", "DY", "DEPTH"],
        allow_negative_numbers = true,
        conflicts_with = "from_log"
    )]
    file: Option<Vec<String>>,

    /// Level a file from a saved height log: LOG FILE [DEPTH]
    #[arg(
        short = 'l',
        long = "from-log",
        num_args = 2..=3,
        value_names = ["LOG", "FILE", "DEPTH"],
        allow_negative_numbers = true
    )]
    from_log: Option<Vec<String>>,

    /// Config file (.toml or .json); defaults to the user config if present
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Serial port of the controller
    #[arg(long)]
    port: Option<String>,

    /// Serial baud rate
    #[arg(long)]
    baud: Option<u32>,

    /// Where to write the probed heights
    #[arg(long)]
    height_log: Option<PathBuf>,

    /// Fail on G-code moves with malformed numbers instead of skipping them
    #[arg(long)]
    strict: bool,

    /// List serial ports that look like CNC controllers and exit
    #[arg(long)]
    list_ports: bool,
}

/// What the positional values of a shape resolved to
enum Action {
    Probe(LevelingJob),
    Level {
        log: PathBuf,
        input: PathBuf,
        mill_depth: f64,
    },
    Usage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging()?;

    if cli.list_ports {
        for port in list_ports()? {
            println!("{}\t{}", port.port_name, port.description);
        }
        return Ok(());
    }

    let config = load_config(&cli)?;
    let pipeline = Pipeline::new(config);

    match resolve(&cli, pipeline.config())? {
        Action::Usage => {
            let mut cmd = Cli::command();
            println!("{}", cmd.render_usage());
            println!("{}", AFTER_HELP);
            Ok(())
        }
        Action::Level {
            log,
            input,
            mill_depth,
        } => {
            let (_, output, report) = pipeline.level_from_log(&log, &input, mill_depth)?;
            println!(
                "Leveled {} -> {} ({} moves rewritten)",
                input.display(),
                output.display(),
                report.rewritten()
            );
            Ok(())
        }
        Action::Probe(job) => {
            let outcome = pipeline.run(&job, SerialTransport::open)?;

            print!("{}", format_height_table(&outcome.height_map));
            if let Some((output, report)) = &outcome.leveled {
                println!(
                    "Leveled file written to {} ({} linear moves, {} plunges, {} outside the probed area)",
                    output.display(),
                    report.linear_moves,
                    report.plunge_pairs,
                    report.out_of_extent
                );
            }
            Ok(())
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::load_or_default()?,
    };

    if let Some(port) = &cli.port {
        config.connection.port = port.clone();
    }
    if let Some(baud) = cli.baud {
        config.connection.baud_rate = baud;
    }
    if let Some(height_log) = &cli.height_log {
        config.output.height_log = height_log.clone();
    }
    if cli.strict {
        config.leveling.strict = true;
    }

    config.validate()?;
    Ok(config)
}

fn resolve(cli: &Cli, config: &Config) -> anyhow::Result<Action> {
    if let Some(values) = &cli.probe {
        return Ok(match values.as_slice() {
            [w, h] => Action::Probe(LevelingJob::new(*w, *h, config)),
            [w, h, dx, dy] => Action::Probe(LevelingJob::new(*w, *h, config).with_steps(*dx, *dy)),
            _ => Action::Usage,
        });
    }

    if let Some(values) = &cli.file {
        return Ok(match values.as_slice() {
            [file, w, h] => Action::Probe(
                LevelingJob::new(number(w)?, number(h)?, config).with_input(file),
            ),
            [file, w, h, dx, dy, depth] => Action::Probe(
                LevelingJob::new(number(w)?, number(h)?, config)
                    .with_steps(number(dx)?, number(dy)?)
                    .with_mill_depth(mill_depth(depth)?)
                    .with_input(file),
            ),
            _ => Action::Usage,
        });
    }

    if let Some(values) = &cli.from_log {
        return Ok(match values.as_slice() {
            [log, file] => Action::Level {
                log: PathBuf::from(log),
                input: PathBuf::from(file),
                mill_depth: config.leveling.mill_depth,
            },
            [log, file, depth] => Action::Level {
                log: PathBuf::from(log),
                input: PathBuf::from(file),
                mill_depth: mill_depth(depth)?,
            },
            _ => Action::Usage,
        });
    }

    let width = prompt("Width of the area along X [mm]: ")?;
    let height = prompt("Height of the area along Y [mm]: ")?;
    Ok(Action::Probe(LevelingJob::new(width, height, config)))
}

fn number(text: &str) -> anyhow::Result<f64> {
    text.parse()
        .with_context(|| format!("'{}' is not a number", text))
}

fn mill_depth(text: &str) -> anyhow::Result<f64> {
    let depth = number(text)?;
    if !depth.is_finite() || depth < 0.0 {
        bail!("Mill depth must be a non-negative number, got '{}'", text);
    }
    Ok(depth)
}

fn prompt(question: &str) -> anyhow::Result<f64> {
    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("{}", question);
        io::stdout().flush()?;

        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            bail!("No input given");
        }
        match line.trim().parse::<f64>() {
            Ok(value) if value > 0.0 => return Ok(value),
            _ => eprintln!("Enter a positive number"),
        }
    }
}
