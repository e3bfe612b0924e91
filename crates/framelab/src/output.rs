use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use framelab_switch::{InterfaceSpec, VlanMode};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct InterfacesOutput<'a> {
    count: usize,
    interfaces: &'a [InterfaceSpec],
}

pub fn print_interfaces(interfaces: &[InterfaceSpec], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = InterfacesOutput {
                count: interfaces.len(),
                interfaces,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["#", "NAME", "MODE", "VLANS"]);
            for spec in interfaces {
                table.add_row(vec![
                    spec.index.to_string(),
                    spec.name.clone(),
                    mode_name(&spec.mode).to_string(),
                    vlan_list(&spec.mode),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for spec in interfaces {
                println!(
                    "#{} {} {} vlan {}",
                    spec.index,
                    spec.name,
                    mode_name(&spec.mode),
                    vlan_list(&spec.mode)
                );
            }
        }
        OutputFormat::Raw => {
            for spec in interfaces {
                println!("{spec}");
            }
        }
    }
}

fn mode_name(mode: &VlanMode) -> &'static str {
    match mode {
        VlanMode::Tagged(_) => "tagged",
        VlanMode::Untagged(_) => "untagged",
    }
}

fn vlan_list(mode: &VlanMode) -> String {
    match mode {
        VlanMode::Tagged(vlans) => vlans
            .iter()
            .map(u16::to_string)
            .collect::<Vec<_>>()
            .join(","),
        VlanMode::Untagged(native) => native.to_string(),
    }
}
