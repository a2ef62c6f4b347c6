//! Command set built from the loaded manifests.
//!
//! Every manifest becomes one subcommand: positional slots for its
//! `isArgument` entries in declared order, one option per remaining entry.
//! clap only tokenizes the command line; required arguments and flag
//! conflicts are checked here so the errors come with our own help text.

use std::collections::HashMap;
use std::ffi::OsString;
use std::sync::Arc;

use clap::{Arg, ArgAction, ArgMatches, Args, Command, FromArgMatches};

use scriptmux_core::invocation::{Invocation, OptionValue};
use scriptmux_core::manifest::{ArgumentSpec, ScriptManifest};

use crate::error::{CliError, RegistryError, ValidationError};
use crate::flags::{global_args, global_option_help, GlobalFlags};
use crate::help::{render_command_help, render_root_help, HelpSpec, OptionHelp};

/// Outcome of matching a command line against the registry.
#[derive(Debug)]
pub enum Resolution {
    Help(String),
    Invoke {
        invocation: Invocation,
        flags: GlobalFlags,
    },
}

#[derive(Debug, Clone)]
pub struct CommandRegistry {
    bin_name: String,
    manifests: Vec<Arc<ScriptManifest>>,
}

impl CommandRegistry {
    pub fn new(
        bin_name: impl Into<String>,
        manifests: Vec<ScriptManifest>,
    ) -> Result<Self, RegistryError> {
        if manifests.is_empty() {
            return Err(RegistryError::NoScripts);
        }

        let reserved = ReservedFlags::from_globals();
        for manifest in &manifests {
            reserved.check(manifest)?;
        }

        Ok(Self {
            bin_name: bin_name.into(),
            manifests: manifests.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn manifests(&self) -> &[Arc<ScriptManifest>] {
        &self.manifests
    }

    pub fn find(&self, name: &str) -> Option<&Arc<ScriptManifest>> {
        self.manifests.iter().find(|m| m.name == name)
    }

    /// Root command with one subcommand per manifest.
    pub fn command(&self) -> Command {
        let root = Command::new(self.bin_name.clone())
            .disable_help_flag(true)
            .disable_help_subcommand(true)
            .disable_version_flag(true)
            .allow_external_subcommands(true);

        let root = GlobalFlags::augment_args(root);
        self.manifests
            .iter()
            .fold(root, |root, manifest| root.subcommand(script_command(manifest)))
    }

    pub fn root_help(&self) -> String {
        let commands: Vec<(String, String)> = self
            .manifests
            .iter()
            .map(|m| (m.name.clone(), m.description.clone()))
            .collect();
        render_root_help(&self.bin_name, &global_option_help(), &commands)
    }

    pub fn command_help(&self, manifest: &ScriptManifest) -> String {
        render_command_help(&HelpSpec {
            command_name: &manifest.name,
            parent_name: &self.bin_name,
            description: &manifest.description,
            positionals: manifest.positionals().map(ArgumentSpec::flags_display).collect(),
            options: manifest.options().map(OptionHelp::from_spec).collect(),
            parent_options: global_option_help(),
        })
    }

    /// Match `argv` (including the binary name) to a script invocation.
    pub fn resolve<I, T>(&self, argv: I) -> Result<Resolution, CliError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let usage = |error: ValidationError, help: String| CliError::Usage { error, help };

        let matches = self
            .command()
            .try_get_matches_from(argv)
            .map_err(|e| usage(e.into(), self.root_help()))?;
        let flags = GlobalFlags::from_arg_matches(&matches)
            .map_err(|e| usage(e.into(), self.root_help()))?;

        let selected = matches
            .subcommand()
            .and_then(|(name, sub)| self.find(name).map(|manifest| (manifest, sub)));

        let Some((manifest, sub)) = selected else {
            flags.validate().map_err(|e| usage(e, self.root_help()))?;
            return Ok(Resolution::Help(self.root_help()));
        };

        flags
            .validate()
            .map_err(|e| usage(e, self.command_help(manifest)))?;

        if flags.help {
            return Ok(Resolution::Help(self.command_help(manifest)));
        }

        let invocation = bind(manifest, sub).map_err(|e| usage(e, self.command_help(manifest)))?;
        Ok(Resolution::Invoke { invocation, flags })
    }
}

fn script_command(manifest: &ScriptManifest) -> Command {
    let command = Command::new(manifest.name.clone())
        .about(manifest.description.clone())
        .disable_help_flag(true);

    let command = manifest.positionals().fold(command, |command, spec| {
        command.arg(
            Arg::new(spec.name.clone())
                .action(ArgAction::Set)
                .help(spec.description.clone()),
        )
    });

    manifest.options().fold(command, |command, spec| {
        let mut arg = Arg::new(spec.name.clone()).help(spec.description.clone());
        if let Some(short) = spec.short_flag() {
            arg = arg.short(short);
        }
        if let Some(long) = spec.long_flag() {
            arg = arg.long(long.to_string());
        }
        arg = match spec.value_name.as_deref() {
            Some(value_name) => arg.action(ArgAction::Set).value_name(value_name.to_string()),
            None => arg.action(ArgAction::SetTrue),
        };
        command.arg(arg)
    })
}

/// Map parsed values onto an invocation, keyed by argument name.
fn bind(manifest: &Arc<ScriptManifest>, matches: &ArgMatches) -> Result<Invocation, ValidationError> {
    let mut invocation = Invocation::new(Arc::clone(manifest));

    for spec in &manifest.arguments {
        if spec.is_positional() {
            if let Some(value) = matches.get_one::<String>(&spec.name) {
                invocation.arguments.insert(spec.name.clone(), value.clone());
                continue;
            }
        } else if spec.takes_value() {
            if let Some(value) = matches.get_one::<String>(&spec.name) {
                invocation
                    .options
                    .insert(spec.name.clone(), OptionValue::Value(value.clone()));
                continue;
            }
        } else if matches.get_flag(&spec.name) {
            invocation
                .options
                .insert(spec.name.clone(), OptionValue::Switch(true));
            continue;
        }

        if spec.required {
            return Err(ValidationError::MissingArgument(spec.display_name()));
        }
    }

    Ok(invocation)
}

/// Flag forms and argument ids owned by the global flags.
struct ReservedFlags {
    shorts: Vec<char>,
    longs: Vec<String>,
    ids: Vec<String>,
}

impl ReservedFlags {
    fn from_globals() -> Self {
        let args = global_args();
        Self {
            shorts: args.iter().filter_map(Arg::get_short).collect(),
            longs: args
                .iter()
                .filter_map(Arg::get_long)
                .map(str::to_string)
                .collect(),
            ids: args.iter().map(|a| a.get_id().as_str().to_string()).collect(),
        }
    }

    fn check(&self, manifest: &ScriptManifest) -> Result<(), RegistryError> {
        let collision = |spec: &ArgumentSpec, flag: String, other: String| RegistryError::FlagCollision {
            script: manifest.name.clone(),
            argument: spec.name.clone(),
            flag,
            other,
        };
        let globals = || "the global options".to_string();

        let mut seen: HashMap<String, &str> = HashMap::new();
        for spec in &manifest.arguments {
            if self.ids.contains(&spec.name) {
                return Err(collision(spec, format!("name '{}'", spec.name), globals()));
            }
            if spec.is_positional() {
                continue;
            }

            let mut forms = Vec::with_capacity(2);
            if let Some(short) = spec.short_flag() {
                if self.shorts.contains(&short) {
                    return Err(collision(spec, format!("-{short}"), globals()));
                }
                forms.push(format!("-{short}"));
            }
            if let Some(long) = spec.long_flag() {
                if self.longs.iter().any(|l| l == long) {
                    return Err(collision(spec, format!("--{long}"), globals()));
                }
                forms.push(format!("--{long}"));
            }

            for form in forms {
                if let Some(owner) = seen.insert(form.clone(), &spec.name) {
                    return Err(collision(spec, form, format!("argument '{owner}'")));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use assert_matches::assert_matches;

    use super::*;

    fn positional(name: &str, required: bool) -> ArgumentSpec {
        ArgumentSpec {
            name: name.to_string(),
            short_name: None,
            long_name: None,
            required,
            is_argument: true,
            description: format!("The {name}"),
            value_name: None,
        }
    }

    fn option(name: &str, short: Option<&str>, long: Option<&str>) -> ArgumentSpec {
        ArgumentSpec {
            name: name.to_string(),
            short_name: short.map(str::to_string),
            long_name: long.map(str::to_string),
            required: false,
            is_argument: false,
            description: String::new(),
            value_name: None,
        }
    }

    fn manifest(name: &str, arguments: Vec<ArgumentSpec>) -> ScriptManifest {
        ScriptManifest {
            name: name.to_string(),
            description: format!("Run {name}"),
            version: None,
            main: None,
            directory: PathBuf::from("/scripts").join(name),
            arguments,
            use_lock_file: false,
            monitoring: None,
        }
    }

    fn sync_manifest() -> ScriptManifest {
        let mut out = option("out", Some("Output"), Some("out"));
        out.value_name = Some("file".to_string());
        manifest(
            "sync",
            vec![
                positional("source", true),
                positional("target", false),
                option("force", Some("f"), Some("force")),
                out,
            ],
        )
    }

    fn registry() -> CommandRegistry {
        CommandRegistry::new("scriptmux", vec![manifest("report", vec![]), sync_manifest()]).unwrap()
    }

    fn resolve(args: &[&str]) -> Result<Resolution, CliError> {
        registry().resolve(std::iter::once("scriptmux").chain(args.iter().copied()))
    }

    #[test]
    fn empty_manifest_list_is_rejected() {
        assert_matches!(
            CommandRegistry::new("scriptmux", Vec::new()),
            Err(RegistryError::NoScripts)
        );
    }

    #[test]
    fn global_flag_collisions_are_rejected() {
        let err = CommandRegistry::new(
            "scriptmux",
            vec![manifest("x", vec![option("version", Some("Verbose"), None)])],
        )
        .unwrap_err();
        assert_matches!(err, RegistryError::FlagCollision { ref flag, .. } if flag == "-v");

        let err = CommandRegistry::new(
            "scriptmux",
            vec![manifest("x", vec![option("show", None, Some("help"))])],
        )
        .unwrap_err();
        assert_matches!(err, RegistryError::FlagCollision { ref flag, .. } if flag == "--help");

        let err = CommandRegistry::new("scriptmux", vec![manifest("x", vec![positional("quiet", false)])])
            .unwrap_err();
        assert_matches!(err, RegistryError::FlagCollision { .. });
    }

    #[test]
    fn flags_colliding_within_a_script_are_rejected() {
        let err = CommandRegistry::new(
            "scriptmux",
            vec![manifest(
                "x",
                vec![option("fast", Some("f"), None), option("full", Some("F"), None)],
            )],
        )
        .unwrap_err();
        assert_matches!(
            err,
            RegistryError::FlagCollision { ref argument, ref other, .. }
                if argument == "full" && other == "argument 'fast'"
        );
    }

    #[test]
    fn short_names_use_their_lowercased_first_letter() {
        let help = registry().command_help(&sync_manifest());
        assert!(help.contains("  -o, --out <file>"));

        let Resolution::Invoke { invocation, .. } = resolve(&["sync", "/data", "-o", "x.txt"]).unwrap()
        else {
            panic!("expected an invocation");
        };
        assert_eq!(invocation.options["out"], OptionValue::Value("x.txt".to_string()));
    }

    #[test]
    fn binds_positionals_and_options_by_name() {
        let resolution = resolve(&["-v", "sync", "/data", "/backup", "--force", "-o", "r.txt"]).unwrap();
        let Resolution::Invoke { invocation, flags } = resolution else {
            panic!("expected an invocation");
        };

        assert!(flags.verbose);
        assert_eq!(invocation.name(), "sync");
        assert_eq!(invocation.arguments["source"], "/data");
        assert_eq!(invocation.arguments["target"], "/backup");
        assert_eq!(invocation.options["force"], OptionValue::Switch(true));
        assert_eq!(invocation.options["out"], OptionValue::Value("r.txt".to_string()));
        assert_eq!(invocation.positional_values(), ["/data", "/backup"]);
    }

    #[test]
    fn absent_optional_arguments_are_left_out() {
        let Resolution::Invoke { invocation, .. } = resolve(&["sync", "/data"]).unwrap() else {
            panic!("expected an invocation");
        };
        assert!(!invocation.arguments.contains_key("target"));
        assert!(invocation.options.is_empty());
    }

    #[test]
    fn global_flags_after_the_command() {
        let Resolution::Invoke { flags, .. } = resolve(&["sync", "/data", "--quiet"]).unwrap() else {
            panic!("expected an invocation");
        };
        assert!(flags.quiet);
    }

    #[test]
    fn missing_required_positional_is_a_usage_error() {
        let err = resolve(&["sync"]).unwrap_err();
        assert_matches!(
            &err,
            CliError::Usage { error: ValidationError::MissingArgument(name), .. } if name == "source"
        );
        assert!(err.help().unwrap().starts_with("Usage: scriptmux sync [options] <source> [target]"));
    }

    #[test]
    fn missing_required_option_names_its_flag() {
        let mut token = option("token", Some("t"), Some("token"));
        token.required = true;
        token.value_name = Some("value".to_string());
        let registry = CommandRegistry::new("scriptmux", vec![manifest("deploy", vec![token])]).unwrap();

        let err = registry.resolve(["scriptmux", "deploy"]).unwrap_err();
        assert_matches!(
            err,
            CliError::Usage { error: ValidationError::MissingArgument(name), .. } if name == "--token"
        );
    }

    #[test]
    fn conflicting_flags_are_a_usage_error() {
        assert_matches!(
            resolve(&["--verbose", "--quiet", "sync", "/data"]),
            Err(CliError::Usage {
                error: ValidationError::ConflictingFlags("--verbose", "--quiet"),
                ..
            })
        );
        assert_matches!(
            resolve(&["-V", "-d"]),
            Err(CliError::Usage {
                error: ValidationError::ConflictingFlags("--view", "--dev"),
                ..
            })
        );
    }

    #[test]
    fn no_command_shows_root_help() {
        let Resolution::Help(text) = resolve(&[]).unwrap() else {
            panic!("expected help");
        };
        assert!(text.starts_with("Usage: scriptmux [options] [command]"));
        assert!(text.contains("  sync"));
        assert!(text.contains("  report"));
    }

    #[test]
    fn unknown_command_shows_root_help() {
        assert_matches!(resolve(&["nope", "--x"]), Ok(Resolution::Help(_)));
    }

    #[test]
    fn help_flag_shows_command_help() {
        let Resolution::Help(text) = resolve(&["sync", "-h"]).unwrap() else {
            panic!("expected help");
        };
        assert!(text.starts_with("Usage: scriptmux sync"));
        assert!(text.contains("Global options:"));
        assert!(text.contains("-o, --out <file>"));
    }

    #[test]
    fn unknown_option_is_a_usage_error() {
        assert_matches!(
            resolve(&["sync", "/data", "--bogus"]),
            Err(CliError::Usage {
                error: ValidationError::Unparseable(_),
                ..
            })
        );
    }
}
