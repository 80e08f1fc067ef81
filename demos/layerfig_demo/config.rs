//! Sections and settings types for the layerfig demo application.
//!
//! # Env var mapping
//!
//! With the prefix `LAYERFIG_DEMO` (derived from the app name), each field
//! maps to `LAYERFIG_DEMO_{SECTION_PREFIX}{FIELD}`:
//!
//! | Env var                                   | Field                    |
//! |-------------------------------------------|--------------------------|
//! | `LAYERFIG_DEMO_SERVER_HOST`               | `server.host`            |
//! | `LAYERFIG_DEMO_SERVER_PORT`               | `server.port`            |
//! | `LAYERFIG_DEMO_SERVER_MAX_CONNECTIONS`    | `server.max_connections` |
//! | `LAYERFIG_DEMO_DISPLAY_COLOR`             | `display.color`          |
//! | `LAYERFIG_DEMO_DISPLAY_FORMAT`            | `display.format`         |
//! | `LAYERFIG_DEMO_PROFILE`                   | `profile-settings.profile` |

use layerfig::{FieldDefinition, FieldType, SchemaSection};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct DemoConfig {
    pub server: ServerConfig,
    pub display: DisplayConfig,
}

/// Flags `--server-host`, `--server-port`, `--server-max-connections`.
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct ServerConfig {
    pub host: String,
    pub port: i64,
    pub max_connections: i64,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct DisplayConfig {
    pub color: String,
    pub format: String,
}

pub fn server_section() -> SchemaSection {
    SchemaSection::new("server", "Server")
        .with_description("Network settings")
        .with_prefix("server-")
        .with_field(
            FieldDefinition::new("host", FieldType::String)
                .with_help("Hostname to bind to")
                .with_default("127.0.0.1"),
        )
        .with_field(
            FieldDefinition::new("port", FieldType::Integer)
                .with_help("Port to listen on")
                .with_default(8080),
        )
        .with_field(
            FieldDefinition::new("max_connections", FieldType::Integer)
                .with_help("Maximum simultaneous connections")
                .with_default(100),
        )
}

pub fn display_section() -> SchemaSection {
    SchemaSection::new("display", "Display")
        .with_prefix("display-")
        .with_field(
            FieldDefinition::new("color", FieldType::Choice)
                .with_help("Color of the echo output")
                .with_choices(["red", "green", "yellow", "blue", "magenta", "cyan"])
                .with_default("yellow"),
        )
        .with_field(
            FieldDefinition::new("format", FieldType::Choice)
                .with_help("Output layout")
                .with_choices(["table", "plain"])
                .with_default("table"),
        )
}
