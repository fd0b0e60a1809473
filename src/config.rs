// src/config.rs
//
// Command-line flags, the optional provider file and the environment,
// folded into one validated `Config`.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use clap::Args;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::llm::{Provider, ProviderConfig};
use crate::testgen::ImportFixer;

const MODEL_ENV: &str = "GOTESTGEN_MODEL";

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    #[arg(long, help = "Path to the Go module under test")]
    pub repo: Option<PathBuf>,

    #[arg(long, help = "File declaring the function under test")]
    pub func_path: Option<PathBuf>,

    #[arg(long = "func", help = "Function under test: Name, Recv.Name or (*Recv).Name")]
    pub func_name: Option<String>,

    #[arg(long, default_value_t = 0, help = "Number of repair rounds")]
    pub rounds: usize,

    #[arg(
        long,
        default_value_t = 0,
        help = "Number of random existing tests to show as examples"
    )]
    pub test_count: usize,

    #[arg(
        long,
        default_value_t = false,
        help = "Also show the function's own test file, if it exists"
    )]
    pub use_func_test_file: bool,

    #[arg(long, help = "Seed for example selection (default: OS entropy)")]
    pub seed: Option<u64>,

    #[arg(
        long,
        default_value_t = 1,
        help = "Levels of referenced function bodies to include"
    )]
    pub depth: usize,

    #[arg(long, help = "Generation provider: openai | anthropic")]
    pub provider: Option<String>,

    #[arg(long, help = "Model name (or set GOTESTGEN_MODEL)")]
    pub model: Option<String>,

    #[arg(long, help = "Override the provider's API endpoint")]
    pub base_url: Option<String>,

    #[arg(long, default_value = "go", help = "Go binary used to run tests")]
    pub go: String,

    #[arg(
        long,
        default_value = "goimports -w",
        help = "Import fixer run on the test file after each save"
    )]
    pub imports_tool: String,

    #[arg(long, default_value_t = false, help = "Skip the import fixer")]
    pub no_imports: bool,

    #[arg(
        long,
        default_value_t = false,
        help = "Spend a repair round on unusable generator output instead of failing"
    )]
    pub repair_malformed: bool,

    #[arg(short, long, default_value_t = false, help = "Debug logging on stderr")]
    pub verbose: bool,
}

/// Provider defaults read from `<config dir>/gotestgen/config.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct FileConfig {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl FileConfig {
    pub fn default_path() -> PathBuf {
        let mut base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        base.push("gotestgen");
        base.push("config.toml");
        base
    }

    /// A missing file is an empty config; an unreadable or invalid one is an
    /// error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub repo: PathBuf,
    pub func_path: PathBuf,
    pub func_name: String,
    pub rounds: usize,
    pub test_count: usize,
    pub use_func_test_file: bool,
    pub seed: Option<u64>,
    pub depth: usize,
    pub go: String,
    pub imports: ImportFixer,
    pub repair_malformed: bool,
    pub verbose: bool,
    pub provider: ProviderConfig,
}

impl Config {
    pub fn from_args(args: RunArgs) -> Result<Self, ConfigError> {
        let path = FileConfig::default_path();
        let file = FileConfig::load(&path)?;
        Self::resolve(args, file, &path, |key| env::var(key).ok())
    }

    /// Flags win over the environment, which wins over the file.
    pub fn resolve<E>(
        args: RunArgs,
        file: FileConfig,
        file_path: &Path,
        env: E,
    ) -> Result<Self, ConfigError>
    where
        E: Fn(&str) -> Option<String>,
    {
        let repo = args.repo.ok_or(ConfigError::Missing("repo"))?;
        let func_path = args.func_path.ok_or(ConfigError::Missing("func-path"))?;
        let func_name = args
            .func_name
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::Missing("func"))?;

        let provider = match args.provider.or(file.provider) {
            Some(name) => Provider::parse(&name)?,
            None => Provider::OpenAI,
        };

        let api_key = env(provider.key_env())
            .filter(|k| !k.trim().is_empty())
            .or(file.api_key)
            .ok_or_else(|| ConfigError::MissingApiKey {
                provider: provider.name(),
                env: provider.key_env(),
                config: file_path.display().to_string(),
            })?;

        let model = args
            .model
            .or_else(|| env(MODEL_ENV))
            .or(file.model)
            .unwrap_or_else(|| provider.default_model().to_string());

        let imports = if args.no_imports {
            ImportFixer::disabled()
        } else {
            let mut words = args.imports_tool.split_whitespace();
            match words.next() {
                Some(program) => ImportFixer::command(program, words),
                None => ImportFixer::disabled(),
            }
        };

        Ok(Config {
            repo,
            func_path,
            func_name,
            rounds: args.rounds,
            test_count: args.test_count,
            use_func_test_file: args.use_func_test_file,
            seed: args.seed,
            depth: args.depth.max(1),
            go: args.go,
            imports,
            repair_malformed: args.repair_malformed,
            verbose: args.verbose,
            provider: ProviderConfig {
                provider,
                model,
                api_key,
                base_url: args.base_url.or(file.base_url),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn args() -> RunArgs {
        RunArgs {
            repo: Some("/repo".into()),
            func_path: Some("pkg/calc.go".into()),
            func_name: Some("Add".into()),
            depth: 1,
            go: "go".into(),
            imports_tool: "goimports -w".into(),
            ..RunArgs::default()
        }
    }

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn resolve(args: RunArgs, file: FileConfig, env: &[(&str, &str)]) -> Result<Config, ConfigError> {
        Config::resolve(args, file, Path::new("/cfg/config.toml"), env_of(env))
    }

    #[test]
    fn required_flags_are_reported_by_name() {
        let missing = RunArgs {
            func_name: None,
            ..args()
        };
        match resolve(missing, FileConfig::default(), &[("OPENAI_API_KEY", "k")]) {
            Err(ConfigError::Missing(flag)) => assert_eq!(flag, "func"),
            other => panic!("unexpected: {other:?}"),
        }

        let missing = RunArgs {
            repo: None,
            ..args()
        };
        assert!(matches!(
            resolve(missing, FileConfig::default(), &[]),
            Err(ConfigError::Missing("repo"))
        ));
    }

    #[test]
    fn environment_overrides_file_and_flags_override_environment() {
        let file = FileConfig {
            model: Some("file-model".into()),
            api_key: Some("file-key".into()),
            ..FileConfig::default()
        };

        let cfg = resolve(args(), file.clone(), &[]).unwrap();
        assert_eq!(cfg.provider.api_key, "file-key");
        assert_eq!(cfg.provider.model, "file-model");

        let env = [("OPENAI_API_KEY", "env-key"), ("GOTESTGEN_MODEL", "env-model")];
        let cfg = resolve(args(), file.clone(), &env).unwrap();
        assert_eq!(cfg.provider.api_key, "env-key");
        assert_eq!(cfg.provider.model, "env-model");

        let flagged = RunArgs {
            model: Some("flag-model".into()),
            ..args()
        };
        let cfg = resolve(flagged, file, &env).unwrap();
        assert_eq!(cfg.provider.model, "flag-model");
    }

    #[test]
    fn provider_selects_key_variable_and_default_model() {
        let anthropic = RunArgs {
            provider: Some("Anthropic".into()),
            ..args()
        };
        let cfg = resolve(anthropic, FileConfig::default(), &[("ANTHROPIC_API_KEY", "a")]).unwrap();
        assert_eq!(cfg.provider.provider, Provider::Anthropic);
        assert_eq!(cfg.provider.model, "claude-sonnet-4-5");

        let err = resolve(args(), FileConfig::default(), &[("ANTHROPIC_API_KEY", "a")]).unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));

        let bogus = RunArgs {
            provider: Some("ollama".into()),
            ..args()
        };
        assert!(matches!(
            resolve(bogus, FileConfig::default(), &[]),
            Err(ConfigError::UnknownProvider(_))
        ));
    }

    #[test]
    fn import_fixer_is_split_or_disabled() {
        let env = [("OPENAI_API_KEY", "k")];
        let cfg = resolve(args(), FileConfig::default(), &env).unwrap();
        assert_eq!(cfg.imports, ImportFixer::goimports());

        let custom = RunArgs {
            imports_tool: "gofumpt -l -w".into(),
            ..args()
        };
        let cfg = resolve(custom, FileConfig::default(), &env).unwrap();
        assert_eq!(cfg.imports, ImportFixer::command("gofumpt", ["-l", "-w"]));

        let off = RunArgs {
            no_imports: true,
            ..args()
        };
        let cfg = resolve(off, FileConfig::default(), &env).unwrap();
        assert_eq!(cfg.imports, ImportFixer::disabled());
    }

    #[test]
    fn file_config_is_optional_but_must_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        assert_eq!(FileConfig::load(&path).unwrap(), FileConfig::default());

        fs::write(&path, "provider = \"anthropic\"\napi_key = \"sk\"\n").unwrap();
        let file = FileConfig::load(&path).unwrap();
        assert_eq!(file.provider.as_deref(), Some("anthropic"));
        assert_eq!(file.api_key.as_deref(), Some("sk"));

        fs::write(&path, "provider = [").unwrap();
        assert!(matches!(FileConfig::load(&path), Err(ConfigError::Parse { .. })));
    }
}
