use serde::Serialize;
use tabwright::classifier::{ats_systems, providers};

use crate::context::CommandContext;
use crate::output::print_record;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProviderInfo {
	name: &'static str,
	timeout_ms: u64,
}

#[derive(Debug, Serialize)]
struct Catalog {
	providers: Vec<ProviderInfo>,
	ats: Vec<&'static str>,
}

pub fn execute(ctx: &CommandContext) -> anyhow::Result<()> {
	let catalog = Catalog {
		providers: providers()
			.iter()
			.map(|provider| ProviderInfo {
				name: provider.name,
				timeout_ms: provider.timeout_ms,
			})
			.collect(),
		ats: ats_systems().iter().map(|ats| ats.name).collect(),
	};

	print_record(ctx.format, &catalog, || {
		let mut text = String::from("Identity providers (match priority order):\n");
		for provider in &catalog.providers {
			text.push_str(&format!("  {:<12} timeout {}ms\n", provider.name, provider.timeout_ms));
		}
		text.push_str("Application tracking systems:\n");
		for name in &catalog.ats {
			text.push_str(&format!("  {name}\n"));
		}
		text.trim_end().to_string()
	})
}
