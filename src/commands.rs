//! Subcommand handlers.

use std::io::Write;

use anyhow::{Context as _, Result, bail};
use tracing::info;

use crate::cli::{Commands, SendArgs};
use crate::config::Config;
use crate::delivery::{Connectivity, DeliveryShim, ImageOutcome};
use crate::store::TemplateStore;

/// Everything a command needs, built once in `main`.
pub struct Context {
    pub config: Config,
    pub store: TemplateStore,
    pub shim: DeliveryShim,
}

/// Run one non-interactive command, writing user-facing output to `out`.
pub fn dispatch(ctx: &mut Context, command: Commands, out: &mut dyn Write) -> Result<()> {
    match command {
        Commands::Tui { .. } => bail!("The terminal UI cannot be started from here"),
        Commands::List => cmd_list(&ctx.store, out),
        Commands::Show { index } => cmd_show(&ctx.store, index, out),
        Commands::Add { name, message } => cmd_add(&mut ctx.store, &name, &message, out),
        Commands::Edit {
            index,
            name,
            message,
        } => cmd_edit(
            &mut ctx.store,
            index,
            name.as_deref(),
            message.as_deref(),
            out,
        ),
        Commands::Delete { index } => cmd_delete(&mut ctx.store, index, out),
        Commands::Send(args) => cmd_send(&ctx.store, &ctx.shim, &args, out),
        Commands::Image { to } => cmd_image(&ctx.shim, &ctx.config.images.urls, &to, out),
        Commands::Test => cmd_test(&ctx.shim, out),
        Commands::Detect => cmd_detect(&ctx.shim, out),
        Commands::Reset => cmd_reset(&mut ctx.store, out),
    }
}

fn cmd_list(store: &TemplateStore, out: &mut dyn Write) -> Result<()> {
    if store.is_empty() {
        writeln!(out, "No templates")?;
        return Ok(());
    }
    for (i, template) in store.templates().iter().enumerate() {
        writeln!(out, "{:>3}  {}", i, template.name)?;
    }
    Ok(())
}

fn cmd_show(store: &TemplateStore, index: usize, out: &mut dyn Write) -> Result<()> {
    let template = store.get(index)?;
    writeln!(out, "{}", template.name)?;
    writeln!(out)?;
    writeln!(out, "{}", template.message)?;
    Ok(())
}

fn cmd_add(store: &mut TemplateStore, name: &str, message: &str, out: &mut dyn Write) -> Result<()> {
    let template = store.create(name, message)?;
    writeln!(out, "Added template {} '{}'", store.len() - 1, template.name)?;
    Ok(())
}

fn cmd_edit(
    store: &mut TemplateStore,
    index: usize,
    name: Option<&str>,
    message: Option<&str>,
    out: &mut dyn Write,
) -> Result<()> {
    if name.is_none() && message.is_none() {
        bail!("Nothing to change: pass --name and/or --message");
    }

    let current = store.get(index)?.clone();
    let template = store.update(
        index,
        name.unwrap_or(&current.name),
        message.unwrap_or(&current.message),
    )?;
    writeln!(out, "Updated template {} '{}'", index, template.name)?;
    Ok(())
}

fn cmd_delete(store: &mut TemplateStore, index: usize, out: &mut dyn Write) -> Result<()> {
    let removed = store.delete(index)?;
    writeln!(out, "Deleted template '{}'", removed.name)?;
    Ok(())
}

/// Look a template up by index first, then by name.
fn resolve_template(store: &TemplateStore, key: &str) -> Result<usize> {
    if let Ok(index) = key.trim().parse::<usize>() {
        store.get(index)?;
        return Ok(index);
    }
    store
        .find_by_name(key)
        .with_context(|| format!("No template named '{}'", key))
}

fn cmd_send(
    store: &TemplateStore,
    shim: &DeliveryShim,
    args: &SendArgs,
    out: &mut dyn Write,
) -> Result<()> {
    let (label, body) = match (&args.body.template, &args.body.message) {
        (Some(key), _) => {
            let template = store.get(resolve_template(store, key)?)?;
            (format!("'{}'", template.name), template.message.as_str())
        }
        (None, Some(message)) => ("message".to_string(), message.as_str()),
        (None, None) => bail!("Pass --template or --message"),
    };

    shim.send_text(&args.to, body)
        .with_context(|| format!("Failed to send to {}", args.to))?;
    info!(recipient = %args.to, "cli_send_completed");
    writeln!(out, "Sent {} to {}", label, args.to)?;
    Ok(())
}

fn cmd_image(shim: &DeliveryShim, urls: &[String], to: &str, out: &mut dyn Write) -> Result<()> {
    let outcome = shim
        .fetch_and_send_random_image(to, urls)
        .with_context(|| format!("Failed to send to {}", to))?;
    match outcome {
        ImageOutcome::Delivered { url } => writeln!(out, "Sent image {} to {}", url, to)?,
        ImageOutcome::FellBackToText { reason } => {
            writeln!(out, "Image failed ({}); sent fallback text to {}", reason, to)?
        }
    }
    Ok(())
}

fn cmd_test(shim: &DeliveryShim, out: &mut dyn Write) -> Result<()> {
    match shim.test_connectivity()? {
        Connectivity::Reachable => {
            writeln!(out, "Messages is reachable")?;
            Ok(())
        }
        Connectivity::Unreachable { diagnostic } => {
            bail!("Messages is not reachable: {}", diagnostic)
        }
    }
}

fn cmd_detect(shim: &DeliveryShim, out: &mut dyn Write) -> Result<()> {
    match shim.active_participant()? {
        Some(participant) => {
            writeln!(out, "{}", participant)?;
            Ok(())
        }
        None => bail!("No active conversation found"),
    }
}

fn cmd_reset(store: &mut TemplateStore, out: &mut dyn Write) -> Result<()> {
    store.reset_to_defaults()?;
    writeln!(out, "Restored {} default templates", store.len())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::SendBody;
    use crate::delivery::tests::{FakeFetcher, FakeRunner, failed_output, ok_output};
    use crate::store::{CorruptPolicy, Template};
    use tempfile::TempDir;

    fn defaults() -> Vec<Template> {
        vec![
            Template::new("Polite Decline", "No thanks").unwrap(),
            Template::new("Stop Request", "STOP").unwrap(),
        ]
    }

    fn context(temp: &TempDir, runner: &FakeRunner) -> Context {
        let store = TemplateStore::open(
            temp.path().join("responses.json"),
            defaults(),
            CorruptPolicy::Backup,
        );
        let shim = DeliveryShim::new(Box::new(runner.clone()), Box::new(FakeFetcher::new(true)))
            .with_fallback_text("QUACK")
            .with_temp_dir(temp.path());
        Context {
            config: Config::default(),
            store,
            shim,
        }
    }

    fn run(ctx: &mut Context, command: Commands) -> (Result<()>, String) {
        let mut out = Vec::new();
        let result = dispatch(ctx, command, &mut out);
        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_list_and_show() {
        let temp = TempDir::new().unwrap();
        let mut ctx = context(&temp, &FakeRunner::default());

        let (result, out) = run(&mut ctx, Commands::List);
        result.unwrap();
        assert_eq!(out, "  0  Polite Decline\n  1  Stop Request\n");

        let (result, out) = run(&mut ctx, Commands::Show { index: 1 });
        result.unwrap();
        assert_eq!(out, "Stop Request\n\nSTOP\n");

        let (result, _) = run(&mut ctx, Commands::Show { index: 9 });
        assert!(result.is_err());
    }

    #[test]
    fn test_add_edit_delete_persist() {
        let temp = TempDir::new().unwrap();
        let mut ctx = context(&temp, &FakeRunner::default());

        run(
            &mut ctx,
            Commands::Add {
                name: "Test".to_string(),
                message: "Hi".to_string(),
            },
        )
        .0
        .unwrap();

        run(
            &mut ctx,
            Commands::Edit {
                index: 2,
                name: None,
                message: Some("Hello".to_string()),
            },
        )
        .0
        .unwrap();

        run(&mut ctx, Commands::Delete { index: 0 }).0.unwrap();

        let reloaded = TemplateStore::open(ctx.store.path(), defaults(), CorruptPolicy::Backup);
        assert_eq!(
            reloaded.templates(),
            &[
                Template::new("Stop Request", "STOP").unwrap(),
                Template::new("Test", "Hello").unwrap(),
            ]
        );
    }

    #[test]
    fn test_edit_without_fields_is_error() {
        let temp = TempDir::new().unwrap();
        let mut ctx = context(&temp, &FakeRunner::default());
        let (result, _) = run(
            &mut ctx,
            Commands::Edit {
                index: 0,
                name: None,
                message: None,
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_send_by_name_and_index() {
        let temp = TempDir::new().unwrap();
        let runner = FakeRunner::default();
        let mut ctx = context(&temp, &runner);

        for key in ["stop request", "1"] {
            let (result, out) = run(
                &mut ctx,
                Commands::Send(SendArgs {
                    to: "(555) 000-1111".to_string(),
                    body: SendBody {
                        template: Some(key.to_string()),
                        message: None,
                    },
                }),
            );
            result.unwrap();
            assert_eq!(out, "Sent 'Stop Request' to (555) 000-1111\n");
        }

        let calls = runner.calls.borrow();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].args[..2], ["5550001111".to_string(), "STOP".to_string()]);
    }

    #[test]
    fn test_send_failure_reports_stderr() {
        let temp = TempDir::new().unwrap();
        let runner = FakeRunner::answering(vec![failed_output("no such buddy")]);
        let mut ctx = context(&temp, &runner);

        let (result, _) = run(
            &mut ctx,
            Commands::Send(SendArgs {
                to: "555-000-1111".to_string(),
                body: SendBody {
                    template: None,
                    message: Some("STOP".to_string()),
                },
            }),
        );
        let err = result.unwrap_err();
        assert!(format!("{:#}", err).contains("no such buddy"));
    }

    #[test]
    fn test_send_unknown_template() {
        let temp = TempDir::new().unwrap();
        let mut ctx = context(&temp, &FakeRunner::default());
        let (result, _) = run(
            &mut ctx,
            Commands::Send(SendArgs {
                to: "5550001111".to_string(),
                body: SendBody {
                    template: Some("Nope".to_string()),
                    message: None,
                },
            }),
        );
        assert!(result.unwrap_err().to_string().contains("No template named 'Nope'"));
    }

    #[test]
    fn test_image_falls_back() {
        let temp = TempDir::new().unwrap();
        let runner = FakeRunner::default();
        let mut ctx = context(&temp, &runner);

        let (result, out) = run(
            &mut ctx,
            Commands::Image {
                to: "5550001111".to_string(),
            },
        );
        result.unwrap();
        assert!(out.starts_with("Image failed ("));
        assert_eq!(runner.calls.borrow().len(), 1);
    }

    #[test]
    fn test_test_and_detect() {
        let temp = TempDir::new().unwrap();
        let runner = FakeRunner::answering(vec![
            ok_output("Messages app is accessible"),
            failed_output("Not authorized"),
            ok_output("tel:+15550001111"),
            ok_output("No active conversation found"),
        ]);
        let mut ctx = context(&temp, &runner);

        assert_eq!(run(&mut ctx, Commands::Test).1, "Messages is reachable\n");
        assert!(
            run(&mut ctx, Commands::Test)
                .0
                .unwrap_err()
                .to_string()
                .contains("Not authorized")
        );
        assert_eq!(run(&mut ctx, Commands::Detect).1, "+15550001111\n");
        assert!(run(&mut ctx, Commands::Detect).0.is_err());
    }

    #[test]
    fn test_reset_restores_defaults() {
        let temp = TempDir::new().unwrap();
        let mut ctx = context(&temp, &FakeRunner::default());
        ctx.store.delete(0).unwrap();

        let (result, out) = run(&mut ctx, Commands::Reset);
        result.unwrap();
        assert_eq!(out, "Restored 2 default templates\n");
        assert_eq!(ctx.store.templates(), defaults().as_slice());
    }
}
