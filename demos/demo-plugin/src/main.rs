//! Demo plugin exercising the capability-addressed plugin runtime: one
//! capability that uppercases text, one that echoes a typed JSON struct
//! back as its own description.

use std::collections::HashMap;

use manifest::{Arguments, Capability, Manifest, Output, ValueType};
use plugin_runtime::PluginRuntime;
use protocol::Limits;
use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};

const UPPERCASE_CAP: &str = "action=transform;type=text_uppercase;in=text/plain";
const DESCRIBE_CAP: &str = "action=describe";

#[derive(Debug, Deserialize)]
struct DescribeArgs {
    #[serde(default)]
    verbose: bool,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt::fmt().with_env_filter(env_filter).with_writer(std::io::stderr).init();
}

fn manifest() -> Manifest {
    Manifest {
        name: "capmux_demo_plugin".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        description: "Demonstrates a capability-addressed plugin with two handlers".to_string(),
        author: None,
        caps: vec![
            Capability {
                key: capkey::CapKey::parse(UPPERCASE_CAP).expect("valid built-in cap"),
                version: "1.0.0".to_string(),
                command: "uppercase".to_string(),
                description: Some("Uppercases the given text/plain input".to_string()),
                metadata: HashMap::new(),
                accepts_stdin: true,
                arguments: Arguments::default(),
                output: Some(Output {
                    output_type: ValueType::String,
                    schema_ref: None,
                    content_type: Some("text/plain".to_string()),
                    validation: None,
                    description: Some("The uppercased text".to_string()),
                }),
            },
            Capability {
                key: capkey::CapKey::parse(DESCRIBE_CAP).expect("valid built-in cap"),
                version: "1.0.0".to_string(),
                command: "describe".to_string(),
                description: Some("Returns this plugin's own metadata as JSON".to_string()),
                metadata: HashMap::new(),
                accepts_stdin: false,
                arguments: Arguments::default(),
                output: Some(Output {
                    output_type: ValueType::Object,
                    schema_ref: None,
                    content_type: Some("application/json".to_string()),
                    validation: None,
                    description: None,
                }),
            },
        ],
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let mut runtime = PluginRuntime::new();

    runtime.register_raw(UPPERCASE_CAP, |_cap, payload, emitter, _peer| {
        let text = String::from_utf8_lossy(&payload).to_uppercase();
        emitter.emit_stream("text/plain", text.as_bytes())?;
        emitter.end()
    })?;

    runtime.register::<DescribeArgs, _>(DESCRIBE_CAP, |_cap, args, emitter, _peer| {
        let body = if args.verbose {
            serde_json::json!({ "name": "capmux_demo_plugin", "version": env!("CARGO_PKG_VERSION"), "caps": 2 })
        } else {
            serde_json::json!({ "name": "capmux_demo_plugin" })
        };
        emitter.emit_stream("application/json", body.to_string().as_bytes())?;
        emitter.end()
    })?;

    let manifest_bytes = manifest().to_cbor_bytes()?;
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut reader = stdin.lock();
    let mut writer = stdout.lock();

    runtime.run(&mut reader, &mut writer, Limits::DEFAULT, manifest_bytes)?;
    Ok(())
}
