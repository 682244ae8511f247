use serde::Serialize;
use tabwright::{Completion, Purpose, classify_completion, classify_context};
use tracing::info;

use crate::context::CommandContext;
use crate::output::print_record;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClassifyReport<'a> {
	url: &'a str,
	#[serde(skip_serializing_if = "Option::is_none")]
	provider: Option<&'static str>,
	#[serde(skip_serializing_if = "Option::is_none")]
	ats: Option<&'static str>,
	verification: bool,
	/// Purpose an unknown session would be upgraded to.
	purpose: Purpose,
	completion: Completion,
}

pub fn execute(url: &str, title: &str, ctx: &CommandContext) -> anyhow::Result<()> {
	info!(target = "tabwright", %url, "classify");
	let classification = classify_context(url, title);
	let report = ClassifyReport {
		url,
		provider: classification.provider.map(|provider| provider.name),
		ats: classification.ats.map(|ats| ats.name),
		verification: classification.verification,
		purpose: classification.upgrade(Purpose::Unknown),
		completion: classify_completion(url, classification.provider),
	};

	print_record(ctx.format, &report, || {
		let completion = match report.completion {
			Completion::Success => "success",
			Completion::Failure => "failure",
			Completion::Pending => "pending",
		};
		format!(
			"url:          {}\nprovider:     {}\nats:          {}\nverification: {}\npurpose:      {}\ncompletion:   {}",
			report.url,
			report.provider.unwrap_or("-"),
			report.ats.unwrap_or("-"),
			report.verification,
			report.purpose,
			completion,
		)
	})
}
