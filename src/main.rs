use clap::{Arg, ArgAction, ArgMatches, Command};
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use url::Url;

use iorelay::job::copy;
use iorelay::logging::*;
use iorelay::serve::{self, WorkerArgs};
use iorelay::udsentry::{field, field_name, UdsValue};
use iorelay::{Config, Job, JobEvent, JobFlags, JobOptions, Scheduler, UdsEntry};

///////////////////////
// Utility functions //
///////////////////////

/// Accept URLs as well as plain local paths
fn location(arg: &str) -> Result<Url, Box<dyn Error>> {
	if arg.contains("://") {
		return Ok(Url::parse(arg)?);
	}
	let path = Path::new(arg);
	let absolute = if path.is_absolute() { path.to_path_buf() } else { std::env::current_dir()?.join(path) };
	Url::from_file_path(&absolute).map_err(|()| format!("Cannot turn {} into a URL", arg).into())
}

fn arg_url(matches: &ArgMatches, name: &str) -> Result<Url, Box<dyn Error>> {
	let value = matches.get_one::<String>(name).ok_or_else(|| format!("{} argument required", name))?;
	location(value)
}

fn transfer_flags(matches: &ArgMatches) -> JobFlags {
	JobFlags {
		overwrite: matches.get_flag("overwrite"),
		resume: matches.get_flag("resume"),
		..Default::default()
	}
}

fn print_entry(entry: &UdsEntry) {
	for (id, value) in entry.fields() {
		match value {
			UdsValue::Str(s) => println!("{:>20}: {}", field_name(id), s),
			UdsValue::Num(n) => println!("{:>20}: {}", field_name(id), n),
		}
	}
}

fn transfer_command(name: &'static str, about: &'static str) -> Command {
	Command::new(name)
		.about(about)
		.arg(Arg::new("src").required(true))
		.arg(Arg::new("dest").required(true))
		.arg(
			Arg::new("overwrite")
				.short('f')
				.long("overwrite")
				.action(ArgAction::SetTrue)
				.help("Replace an existing destination"),
		)
		.arg(
			Arg::new("resume")
				.short('r')
				.long("resume")
				.action(ArgAction::SetTrue)
				.help("Continue a partial transfer"),
		)
}

/// Stream a get job to stdout
async fn cat(scheduler: &Scheduler, url: &Url) -> Result<(), Box<dyn Error>> {
	let mut job = Job::get(scheduler, url, JobOptions::default());
	let mut stdout = tokio::io::stdout();
	while let Some(event) = job.next_event().await {
		match event {
			JobEvent::Data(chunk) => stdout.write_all(&chunk).await?,
			JobEvent::Redirection(to) => info!("Redirected to {}", to),
			JobEvent::Warning(text) => warn!("{}", text),
			JobEvent::Finished(result) => result?,
			_ => {}
		}
	}
	stdout.flush().await?;
	Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
	let matches = Command::new("iorelay")
		.version("0.1.0")
		.about("Out-of-process I/O workers")
		.subcommand_required(true)
		.arg(
			Arg::new("config")
				.short('c')
				.long("config")
				.value_name("FILE")
				.help("Configuration file (TOML or JSON5)"),
		)
		.subcommand(
			Command::new("worker")
				.about("Worker process mode (used internally)")
				.arg(Arg::new("protocol-id").required(true))
				.arg(Arg::new("protocol").required(true))
				.arg(Arg::new("pool-socket").required(true))
				.arg(Arg::new("app-socket").required(true)),
		)
		.subcommand(Command::new("get").about("Write a file to stdout").arg(Arg::new("url").required(true)))
		.subcommand(Command::new("stat").about("Show file attributes").arg(Arg::new("url").required(true)))
		.subcommand(Command::new("ls").about("List a folder").arg(Arg::new("url").required(true)))
		.subcommand(transfer_command("copy", "Copy files or folders"))
		.subcommand(transfer_command("move", "Move files or folders"))
		.subcommand(Command::new("mkdir").about("Create a folder").arg(Arg::new("url").required(true)))
		.subcommand(
			Command::new("rm").about("Delete files or folders recursively").arg(Arg::new("url").required(true)),
		)
		.get_matches();

	if let Some(sub) = matches.subcommand_matches("worker") {
		iorelay::logging::init_tracing("warn");
		let get = |name: &str| sub.get_one::<String>(name).map(|s| s.as_str()).unwrap_or("");
		let args = WorkerArgs::new(get("protocol-id"), get("protocol"), get("pool-socket"), get("app-socket"));
		return serve::serve(args).await;
	}

	let config_path = matches.get_one::<String>("config").map(PathBuf::from);
	let config = Config::load(config_path.as_deref())?;
	iorelay::logging::init_tracing(&config.log_level);
	let scheduler = Scheduler::new(config)?;

	match matches.subcommand() {
		Some(("get", sub)) => cat(&scheduler, &arg_url(sub, "url")?).await?,
		Some(("stat", sub)) => {
			let outcome = Job::stat(&scheduler, &arg_url(sub, "url")?, JobOptions::default()).result().await?;
			if let Some(entry) = outcome.stat {
				print_entry(&entry);
			}
		}
		Some(("ls", sub)) => {
			let outcome = Job::list_dir(&scheduler, &arg_url(sub, "url")?, JobOptions::default()).result().await?;
			let mut entries = outcome.entries;
			entries.sort_by(|a, b| a.name().cmp(&b.name()));
			for entry in &entries {
				let size = entry.number_value(field::SIZE).unwrap_or(0);
				let suffix = if entry.is_dir() { "/" } else { "" };
				println!("{:>12} {}{}", size, entry.name().unwrap_or(""), suffix);
			}
		}
		Some(("copy", sub)) => {
			let options = JobOptions::from(transfer_flags(sub));
			copy::copy(&scheduler, &arg_url(sub, "src")?, &arg_url(sub, "dest")?, options).result().await?;
		}
		Some(("move", sub)) => {
			let options = JobOptions::from(transfer_flags(sub));
			copy::file_move(&scheduler, &arg_url(sub, "src")?, &arg_url(sub, "dest")?, options).result().await?;
		}
		Some(("mkdir", sub)) => {
			Job::mkdir(&scheduler, &arg_url(sub, "url")?, None, JobOptions::default()).result().await?;
		}
		Some(("rm", sub)) => {
			copy::remove(&scheduler, &arg_url(sub, "url")?, JobOptions::default()).result().await?;
		}
		_ => return Err("unknown command".into()),
	}

	Ok(())
}

// vim: ts=4
