//! Command execution.

use crate::Commands;
use colored::Colorize;
use statecraft_core::{Definition, DefinitionLoader, EngineConfig};
use statecraft_tools::{
    definition_template, export, generate_stubs, Severity, TemplateOptions, ValidationReport,
    Validator,
};
use std::fmt::Write as _;
use std::path::Path;

/// Formatted command output.
pub struct Output {
    pub text: String,
    /// False when the command ran but found problems (exit code 1).
    pub success: bool,
}

impl Output {
    fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            success: true,
        }
    }
}

/// Executes a command and returns the formatted output.
pub fn execute(config: &EngineConfig, cmd: Commands) -> Result<Output, Box<dyn std::error::Error>> {
    let loader = DefinitionLoader::from_config(config);

    match cmd {
        Commands::List => list(&loader),

        Commands::Show { id } => {
            let definition = loader.load(&id)?;
            Ok(Output::ok(format_definition(&id, &definition)))
        }

        Commands::Validate { id, all, models } => {
            let validator = if models.is_empty() {
                Validator::new()
            } else {
                Validator::new().with_known_subject_types(models)
            };

            let ids = match (id, all) {
                (Some(id), _) => vec![id],
                (None, true) => loader.source_ids()?,
                (None, false) => {
                    return Err("specify a definition id or use --all".into());
                }
            };
            if ids.is_empty() {
                return Ok(Output::ok(
                    format!(
                        "No definitions found in {}",
                        loader.base_path().display()
                    )
                    .yellow()
                    .to_string(),
                ));
            }

            let reports: Vec<ValidationReport> = ids
                .iter()
                .map(|id| validator.validate_file(&loader, id))
                .collect();
            Ok(format_reports(&reports))
        }

        Commands::Export { id, format, output } => {
            let definition = loader.load(&id)?;
            let text = export(&definition, format)?;
            match output {
                Some(path) => {
                    write_file(&path, &text)?;
                    Ok(Output::ok(format!(
                        "{} {} to {}",
                        "Exported".green(),
                        id.cyan(),
                        path.display()
                    )))
                }
                None => Ok(Output::ok(text)),
            }
        }

        Commands::Make {
            name,
            model,
            states,
            initial,
            force,
        } => {
            let mut options = TemplateOptions::new(&name)
                .states(states)
                .field(&config.default_state_field);
            if let Some(model) = model {
                options = options.model(model);
            }
            if let Some(initial) = initial {
                options = options.initial(initial);
            }

            let path = loader.base_path().join(options.file_name());
            if path.exists() && !force {
                return Err(format!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                )
                .into());
            }

            let text = definition_template(&options);
            // Refuse to write a template that would not load.
            loader.load_str(&text, &name)?;
            write_file(&path, &text)?;

            Ok(Output::ok(format!(
                "{} {}\n{}",
                "Created".green(),
                path.display(),
                "Next: register guards and actions, then run `statecraft validate`".dimmed()
            )))
        }

        Commands::Generate { id, output } => {
            let definition = loader.load(&id)?;
            let code = generate_stubs(&definition);
            match output {
                Some(path) => {
                    write_file(&path, &code)?;
                    Ok(Output::ok(format!(
                        "{} stubs for {} in {}",
                        "Generated".green(),
                        id.cyan(),
                        path.display()
                    )))
                }
                None => Ok(Output::ok(code)),
            }
        }
    }
}

fn list(loader: &DefinitionLoader) -> Result<Output, Box<dyn std::error::Error>> {
    let ids = loader.source_ids()?;
    if ids.is_empty() {
        return Ok(Output::ok(
            format!(
                "No definitions found in {}",
                loader.base_path().display()
            )
            .yellow()
            .to_string(),
        ));
    }

    let mut out = String::new();
    let mut success = true;
    for id in &ids {
        match loader.load(id) {
            Ok(def) => {
                let _ = writeln!(
                    out,
                    "  {} {} ({} states, {} transitions) [{}]",
                    id.cyan(),
                    def.subject_type().dimmed(),
                    def.states().len(),
                    def.transitions().len(),
                    def.checksum()
                );
            }
            Err(e) => {
                success = false;
                let _ = writeln!(out, "  {} {}", id.red(), e.to_string().red());
            }
        }
    }
    let _ = write!(out, "{} definition(s)", ids.len());
    Ok(Output { text: out, success })
}

fn format_definition(id: &str, def: &Definition) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", format!("State machine {}", def.name().cyan()).bold());
    let _ = writeln!(out, "  source:   {}", id);
    let _ = writeln!(out, "  model:    {}", def.subject_type());
    let _ = writeln!(out, "  field:    {}", def.state_field());
    let _ = writeln!(out, "  initial:  {}", def.initial().green());
    let _ = writeln!(out, "  checksum: {}", def.checksum());

    let _ = writeln!(out, "\n{}", "States".bold());
    for state in def.states() {
        if state == def.initial() {
            let _ = writeln!(out, "  {} {}", state.green(), "(initial)".dimmed());
        } else {
            let _ = writeln!(out, "  {}", state);
        }
    }

    let _ = writeln!(out, "\n{}", "Transitions".bold());
    if def.transitions().is_empty() {
        let _ = writeln!(out, "  {}", "(none)".dimmed());
    }
    for t in def.transitions() {
        let _ = write!(out, "  {} -> {}", t.from, t.to.cyan());
        if let Some(guard) = t.guard_label() {
            let _ = write!(out, "  guard: {}", guard.yellow());
        }
        if let Some(action) = &t.action {
            let _ = write!(out, "  action: {}", action.magenta());
        }
        out.push('\n');
    }
    out.trim_end().to_string()
}

fn format_reports(reports: &[ValidationReport]) -> Output {
    let mut out = String::new();
    let mut invalid = 0;

    for report in reports {
        if report.is_valid() {
            let _ = writeln!(out, "{} {}", "✓".green(), report.source);
        } else {
            invalid += 1;
            let _ = writeln!(out, "{} {}", "✗".red(), report.source);
        }
        for issue in &report.issues {
            let severity = match issue.severity {
                Severity::Error => "error".red(),
                Severity::Warning => "warning".yellow(),
            };
            let _ = writeln!(out, "    {}: {}", severity, issue);
        }
    }

    if reports.len() > 1 {
        let _ = writeln!(
            out,
            "\nValid: {}  Invalid: {}  Total: {}",
            reports.len() - invalid,
            invalid,
            reports.len()
        );
    }

    Output {
        text: out.trim_end().to_string(),
        success: invalid == 0,
    }
}

fn write_file(path: &Path, contents: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, contents)
}
