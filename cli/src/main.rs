use clap::{Arg, ArgAction, ArgMatches, Command};
use tilang_core::{CompileConfig, KernelArg, Program, Script, TilangErrorExt, check_source};
use std::path::PathBuf;
use std::process::ExitCode;

mod logger;
mod output;

use output::FormattedOutputHandler;

fn main() -> ExitCode {
    let cli = Command::new("tilang")
        .version("0.1.0")
        .about("Compile and run tilang compute kernels");

    let cli = setup_cli(cli);
    let matches = cli.get_matches();
    logger::init(matches.get_count("verbose"));

    match dispatch_commands(&matches) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let mut out = FormattedOutputHandler::stderr();
            // Nothing sensible to do if stderr itself is gone.
            let _ = out.report(e.as_ref());
            ExitCode::FAILURE
        }
    }
}

fn file_arg() -> Arg {
    Arg::new("file")
        .help("The kernel script to load")
        .required(true)
        .index(1)
}

fn kernel_args() -> [Arg; 2] {
    [
        Arg::new("kernel")
            .help("Name of the kernel to invoke")
            .short('k')
            .long("kernel")
            .required(true)
            .value_parser(clap::value_parser!(String))
            .value_name("NAME"),
        Arg::new("arg")
            .help("Kernel argument: an integer, a float or the name of a script global")
            .short('a')
            .long("arg")
            .action(ArgAction::Append)
            .allow_negative_numbers(true)
            .value_parser(clap::value_parser!(String))
            .value_name("VALUE"),
    ]
}

/// Sets up the CLI with its subcommands and the options they share.
fn setup_cli(cli: Command) -> Command {
    cli.arg(
        Arg::new("verbose")
            .help("Raise the log level (-v debug, -vv trace)")
            .short('v')
            .long("verbose")
            .global(true)
            .action(ArgAction::Count),
    )
    .arg(
        Arg::new("config")
            .help("Read compiler options from a JSON file")
            .short('c')
            .long("config")
            .global(true)
            .value_parser(clap::value_parser!(PathBuf))
            .value_name("FILE"),
    )
    .subcommand(
        Command::new("run")
            .about("Run a kernel and print its result")
            .arg(file_arg())
            .args(kernel_args())
            .arg(
                Arg::new("show-fields")
                    .help("Print every field of the script after the run")
                    .long("show-fields")
                    .action(ArgAction::SetTrue),
            ),
    )
    .subcommand(
        Command::new("ir")
            .about("Print the lowered IR of a kernel specialization")
            .arg(file_arg())
            .args(kernel_args())
            .arg(
                Arg::new("json")
                    .help("Print the IR as JSON")
                    .long("json")
                    .action(ArgAction::SetTrue),
            ),
    )
    .subcommand(
        Command::new("check")
            .about("Parse a script and compile its argument-free kernels")
            .arg(file_arg()),
    )
}

fn load_config(matches: &ArgMatches) -> Result<CompileConfig, Box<dyn TilangErrorExt>> {
    let config = match matches.get_one::<PathBuf>("config") {
        Some(path) => CompileConfig::from_json_file(path)?,
        None => CompileConfig::default(),
    };
    Ok(config.with_env_overrides())
}

fn load_script(sub_m: &ArgMatches) -> Result<Script, Box<dyn TilangErrorExt>> {
    let file = sub_m.get_one::<String>("file").map(PathBuf::from).unwrap_or_default();
    Script::new(file)
}

/// Reads `--arg` values: integers, then floats, otherwise global names.
fn parse_kernel_args(sub_m: &ArgMatches) -> Vec<KernelArg> {
    sub_m
        .get_many::<String>("arg")
        .into_iter()
        .flatten()
        .map(|raw| {
            if let Ok(i) = raw.parse::<i64>() {
                KernelArg::Int(i)
            } else if let Ok(f) = raw.parse::<f64>() {
                KernelArg::Float(f)
            } else {
                KernelArg::Global(raw.clone())
            }
        })
        .collect()
}

fn kernel_name(sub_m: &ArgMatches) -> String {
    sub_m.get_one::<String>("kernel").cloned().unwrap_or_default()
}

/// Dispatches the subcommand the user picked.
fn dispatch_commands(matches: &ArgMatches) -> Result<(), Box<dyn TilangErrorExt>> {
    let config = load_config(matches)?;
    let mut out = FormattedOutputHandler::stdout();
    match matches.subcommand() {
        Some(("run", sub_m)) => {
            let script = load_script(sub_m)?;
            let mut program = Program::from_script(&script, config)?;
            let name = kernel_name(sub_m);
            let result = program.call(&name, &parse_kernel_args(sub_m))?;
            if let Some(value) = result {
                out.value(&name, &value)?;
            }
            if sub_m.get_flag("show-fields") {
                out.fields(&program.fields())?;
            }
        }
        Some(("ir", sub_m)) => {
            let script = load_script(sub_m)?;
            let mut program = Program::from_script(&script, config)?;
            let ir = program.compile(&kernel_name(sub_m), &parse_kernel_args(sub_m))?;
            if sub_m.get_flag("json") {
                out.ir_json(&ir)?;
            } else {
                out.ir(&ir)?;
            }
        }
        Some(("check", sub_m)) => {
            let script = load_script(sub_m)?;
            let program = check_source(&script, config)?;
            out.kernels(&program)?;
            out.success(&format!("{}: ok", script.name))?;
        }
        _ => {
            out.message("No valid subcommand was used. Use --help for more information.")?;
        }
    }
    Ok(())
}
