//! # layerfig demo application
//!
//! A sample CLI tool that shows how an application wires layerfig into clap.
//! It exists to demonstrate and manually verify the resolution chain.
//!
//! ## Running
//!
//! ```sh
//! cargo run --example layerfig_demo
//! cargo run --example layerfig_demo -- --print-parsed-fields
//! ```
//!
//! ## Features demonstrated
//!
//! | Feature            | How to exercise it                                                        |
//! |--------------------|---------------------------------------------------------------------------|
//! | Defaults           | `cargo run --example layerfig_demo`                                       |
//! | Config file (cwd)  | Create `layerfig-demo.yaml` with `server: {port: 9000}` in cwd            |
//! | Env var override   | `LAYERFIG_DEMO_DISPLAY_COLOR=red cargo run --example layerfig_demo`       |
//! | Flag override      | `cargo run --example layerfig_demo -- --server-port 9999`                 |
//! | Profiles           | Add a `staging:` entry to `profiles.yaml`, pass `--profile staging`       |
//! | Provenance listing | `cargo run --example layerfig_demo -- --print-parsed-fields`              |
//! | Single field       | `cargo run --example layerfig_demo -- --get server.port`                  |
//! | YAML dump          | `cargo run --example layerfig_demo -- --dump-yaml`                        |

mod config;

use clap::{Arg, ArgAction, Command};

use layerfig::{Layerfig, LayerfigBuilder, SearchPath, get_value, list_values, values_to_yaml};

use config::{DemoConfig, display_section, server_section};

fn make_builder() -> Result<LayerfigBuilder<DemoConfig>, layerfig::LayerfigError> {
    Layerfig::builder()
        .app_name("layerfig-demo")
        .file_name("layerfig-demo.yaml")
        .search_paths(vec![
            SearchPath::Platform,
            SearchPath::Home(".layerfig-demo".into()),
            SearchPath::Cwd,
        ])
        .profiles(true)
        .register(server_section(), |c: &mut DemoConfig, sv| {
            sv.decode_into(&mut c.server)
        })?
        .register(display_section(), |c: &mut DemoConfig, sv| {
            sv.decode_into(&mut c.display)
        })
}

fn base_command() -> Command {
    Command::new("layerfig-demo")
        .about("A sample CLI app for showcasing layerfig integration")
        .arg(
            Arg::new("print-parsed-fields")
                .long("print-parsed-fields")
                .help("Print every resolved field with its source")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("get")
                .long("get")
                .value_name("SECTION.FIELD")
                .help("Print one field with its full history"),
        )
        .arg(
            Arg::new("dump-yaml")
                .long("dump-yaml")
                .help("Print the resolved values as YAML")
                .action(ArgAction::SetTrue),
        )
}

fn ansi_color_code(name: &str) -> &str {
    match name {
        "red" => "\x1b[31m",
        "green" => "\x1b[32m",
        "yellow" => "\x1b[33m",
        "blue" => "\x1b[34m",
        "magenta" => "\x1b[35m",
        "cyan" => "\x1b[36m",
        _ => "\x1b[0m",
    }
}

const RESET: &str = "\x1b[0m";

fn echo_all(config: &DemoConfig) {
    let color = ansi_color_code(&config.display.color);
    let entries = [
        ("server.host", config.server.host.clone()),
        ("server.port", config.server.port.to_string()),
        ("server.max_connections", config.server.max_connections.to_string()),
        ("display.color", config.display.color.clone()),
        ("display.format", config.display.format.clone()),
    ];

    if config.display.format == "plain" {
        for (key, value) in &entries {
            println!("{key}={value}");
        }
    } else {
        let max_key_len = entries.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
        for (key, value) in &entries {
            println!("{color}{key:<max_key_len$}{RESET}  {value}");
        }
    }
}

fn run() -> Result<(), layerfig::LayerfigError> {
    let builder = make_builder()?;
    let matches = builder.command(base_command())?.get_matches();

    let print_fields = matches.get_flag("print-parsed-fields");
    let dump_yaml = matches.get_flag("dump-yaml");
    let get_key = matches.get_one::<String>("get").cloned();

    let (config, values) = builder.cli_matches(matches).parse_with_values()?;

    if let Some(key) = get_key {
        println!("{}", get_value(&values, &key)?);
    } else if print_fields {
        println!("{}", list_values(&values));
    } else if dump_yaml {
        print!("{}", values_to_yaml(&values)?);
    } else {
        echo_all(&config);
    }
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error:\n{e}");
        std::process::exit(1);
    }
}
