//! Help text rendering.
//!
//! Rendering is pure: callers collect what to show into a [`HelpSpec`] and
//! get the finished text back. Flag columns of a command's own options and
//! of the global options share one width.

use std::fmt::Write as _;

use clap::Arg;

use scriptmux_core::manifest::ArgumentSpec;

/// One row of an options table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionHelp {
    pub flags: String,
    pub description: String,
}

impl OptionHelp {
    pub fn new(flags: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            flags: flags.into(),
            description: description.into(),
        }
    }

    pub fn from_arg(arg: &Arg) -> Self {
        let mut forms = Vec::with_capacity(2);
        if let Some(short) = arg.get_short() {
            forms.push(format!("-{short}"));
        }
        if let Some(long) = arg.get_long() {
            forms.push(format!("--{long}"));
        }
        let description = arg.get_help().map(ToString::to_string).unwrap_or_default();
        Self::new(forms.join(", "), description)
    }

    pub fn from_spec(spec: &ArgumentSpec) -> Self {
        Self::new(spec.flags_display(), spec.description.clone())
    }
}

/// Everything the help of one script command shows.
#[derive(Debug, Clone, Default)]
pub struct HelpSpec<'a> {
    pub command_name: &'a str,
    pub parent_name: &'a str,
    pub description: &'a str,
    /// Usage forms of the positional arguments, e.g. `<source>`.
    pub positionals: Vec<String>,
    pub options: Vec<OptionHelp>,
    pub parent_options: Vec<OptionHelp>,
}

pub fn render_command_help(spec: &HelpSpec<'_>) -> String {
    let width = column_width(spec.options.iter().chain(&spec.parent_options));

    let mut out = format!("Usage: {} {} [options]", spec.parent_name, spec.command_name);
    for positional in &spec.positionals {
        out.push(' ');
        out.push_str(positional);
    }
    out.push('\n');

    if !spec.description.is_empty() {
        let _ = write!(out, "\n{}\n", spec.description);
    }

    if !spec.options.is_empty() {
        out.push_str("\nOptions:\n");
        push_rows(&mut out, &spec.options, width);
    }

    out.push_str("\nGlobal options:\n");
    push_rows(&mut out, &spec.parent_options, width);
    out
}

/// Help shown when no script command was selected.
pub fn render_root_help(
    parent_name: &str,
    options: &[OptionHelp],
    commands: &[(String, String)],
) -> String {
    let mut out = format!("Usage: {parent_name} [options] [command]\n");

    let commands: Vec<OptionHelp> = commands
        .iter()
        .map(|(name, description)| OptionHelp::new(name.clone(), description.clone()))
        .collect();
    let width = column_width(options.iter().chain(&commands));

    out.push_str("\nOptions:\n");
    push_rows(&mut out, options, width);

    if !commands.is_empty() {
        out.push_str("\nCommands:\n");
        push_rows(&mut out, &commands, width);
    }
    out
}

fn column_width<'a>(rows: impl Iterator<Item = &'a OptionHelp>) -> usize {
    rows.map(|row| row.flags.chars().count()).max().unwrap_or(0)
}

fn push_rows(out: &mut String, rows: &[OptionHelp], width: usize) {
    for row in rows {
        let line = format!("  {:<width$}  {}", row.flags, row.description);
        out.push_str(line.trim_end());
        out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn globals() -> Vec<OptionHelp> {
        vec![
            OptionHelp::new("-h, --help", "output usage information"),
            OptionHelp::new("-v, --verbose", "Script verbosity"),
        ]
    }

    #[test]
    fn command_help_layout() {
        let spec = HelpSpec {
            command_name: "sync",
            parent_name: "scriptmux",
            description: "Synchronize records",
            positionals: vec!["<source>".to_string(), "[target]".to_string()],
            options: vec![
                OptionHelp::new("-f, --force", "Overwrite"),
                OptionHelp::new("-o, --out <file>", "Output file"),
            ],
            parent_options: globals(),
        };

        let expected = "\
Usage: scriptmux sync [options] <source> [target]

Synchronize records

Options:
  -f, --force       Overwrite
  -o, --out <file>  Output file

Global options:
  -h, --help        output usage information
  -v, --verbose     Script verbosity
";
        assert_eq!(render_command_help(&spec), expected);
    }

    #[test]
    fn global_options_can_set_the_width() {
        let spec = HelpSpec {
            command_name: "ping",
            parent_name: "scriptmux",
            options: vec![OptionHelp::new("-x", "")],
            parent_options: globals(),
            ..Default::default()
        };

        let expected = "\
Usage: scriptmux ping [options]

Options:
  -x

Global options:
  -h, --help     output usage information
  -v, --verbose  Script verbosity
";
        assert_eq!(render_command_help(&spec), expected);
    }

    #[test]
    fn root_help_lists_commands() {
        let commands = vec![
            ("report".to_string(), "Build the nightly report".to_string()),
            ("sync".to_string(), "Synchronize records".to_string()),
        ];
        let expected = "\
Usage: scriptmux [options] [command]

Options:
  -h, --help     output usage information
  -v, --verbose  Script verbosity

Commands:
  report         Build the nightly report
  sync           Synchronize records
";
        assert_eq!(render_root_help("scriptmux", &globals(), &commands), expected);
    }
}
