use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::transclude;

/// Class name used when no public type declaration is found in Java source
pub const DEFAULT_ENTRY_POINT: &str = "Solution";

/// Base name of staged C++ and Python sources and of the C++ binary
const SOURCE_STEM: &str = "sol";

static JAVA_PUBLIC_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)\bpublic\s+(?:(?:final|abstract|static|sealed|strictfp)\s+)*(?:class|interface|enum|record)\s+([A-Za-z_$][A-Za-z0-9_$]*)",
    )
    .expect("java entry point pattern should be valid")
});

/// Supported target languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Cpp,
    Python,
    Java,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::Cpp, Language::Python, Language::Java];

    /// Source file extension without dot
    pub fn extension(&self) -> &'static str {
        match self {
            Language::Cpp => "cpp",
            Language::Python => "py",
            Language::Java => "java",
        }
    }

    /// Check if the language has a compilation step
    pub fn is_compiled(&self) -> bool {
        !matches!(self, Language::Python)
    }

    /// Guess the language from a file extension
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            "cpp" | "cc" | "cxx" | "c++" => Some(Language::Cpp),
            "py" => Some(Language::Python),
            "java" => Some(Language::Java),
            _ => None,
        }
    }

    /// Parse a language tag as used in configuration and on the command line
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "cpp" | "c++" => Some(Language::Cpp),
            "python" | "py" => Some(Language::Python),
            "java" => Some(Language::Java),
            _ => None,
        }
    }

    fn default_compiler(&self) -> Option<&'static str> {
        match self {
            Language::Cpp => Some("g++"),
            Language::Python => None,
            Language::Java => Some("javac"),
        }
    }

    fn default_interpreter(&self) -> Option<&'static str> {
        match self {
            Language::Cpp => None,
            Language::Python => Some("python3"),
            Language::Java => Some("java"),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Language::Cpp => "cpp",
            Language::Python => "python",
            Language::Java => "java",
        };
        f.write_str(name)
    }
}

/// How to compile and run programs of one language
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolchainConfig {
    pub language: Language,

    /// Compiler executable (g++/javac); unused for Python
    #[serde(default)]
    pub compiler_path: Option<String>,

    /// Extra compiler flags, placed before the source file name
    #[serde(default)]
    pub compiler_flags: Vec<String>,

    /// Interpreter executable (python3/java); unused for C++
    #[serde(default)]
    pub interpreter_path: Option<String>,

    /// Extra interpreter arguments, placed before the program
    #[serde(default)]
    pub interpreter_args: Vec<String>,

    /// Whether to merge solutions into `template_text`
    #[serde(default)]
    pub transclude_enabled: bool,

    /// Template containing the transclusion marker
    #[serde(default)]
    pub template_text: String,
}

/// Invocation recipe for one staged source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPlan {
    /// File name of the source inside the build directory
    pub source_file_name: String,

    /// Entry-point name (Java class name; source stem otherwise)
    pub entry_point: String,

    /// Compiler invocation, run inside the build directory
    pub compile_command: Option<Vec<String>>,

    /// Program invocation; refers to the build directory by absolute path
    pub run_command: Vec<String>,
}

impl ToolchainConfig {
    /// Toolchain with default executables and no flags
    pub fn new(language: Language) -> Self {
        Self {
            language,
            compiler_path: None,
            compiler_flags: Vec::new(),
            interpreter_path: None,
            interpreter_args: Vec::new(),
            transclude_enabled: false,
            template_text: String::new(),
        }
    }

    pub fn with_compiler(mut self, path: impl Into<String>, flags: &[&str]) -> Self {
        self.compiler_path = Some(path.into());
        self.compiler_flags = flags.iter().map(|s| (*s).to_owned()).collect();
        self
    }

    pub fn with_interpreter(mut self, path: impl Into<String>, args: &[&str]) -> Self {
        self.interpreter_path = Some(path.into());
        self.interpreter_args = args.iter().map(|s| (*s).to_owned()).collect();
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.transclude_enabled = true;
        self.template_text = template.into();
        self
    }

    /// Compiler executable, falling back to the language default
    pub fn compiler(&self) -> &str {
        self.compiler_path
            .as_deref()
            .or(self.language.default_compiler())
            .unwrap_or_default()
    }

    /// Interpreter executable, falling back to the language default
    pub fn interpreter(&self) -> &str {
        self.interpreter_path
            .as_deref()
            .or(self.language.default_interpreter())
            .unwrap_or_default()
    }

    /// Apply this toolchain's template to a solution
    pub fn transclude(&self, solution: &str) -> String {
        transclude::apply(&self.template_text, solution, self.transclude_enabled)
    }

    /// Plan how to build and run `source` staged in `build_dir`
    ///
    /// Does not touch the filesystem.
    pub fn plan(&self, source: &str, build_dir: &Path) -> BuildPlan {
        match self.language {
            Language::Cpp => {
                let source_file_name = format!("{SOURCE_STEM}.cpp");
                let mut compile = vec![self.compiler().to_owned()];
                compile.extend(self.compiler_flags.iter().cloned());
                compile.extend([
                    source_file_name.clone(),
                    "-o".to_owned(),
                    SOURCE_STEM.to_owned(),
                ]);

                BuildPlan {
                    source_file_name,
                    entry_point: SOURCE_STEM.to_owned(),
                    compile_command: Some(compile),
                    run_command: vec![path_string(&build_dir.join(SOURCE_STEM))],
                }
            }
            Language::Python => {
                let source_file_name = format!("{SOURCE_STEM}.py");
                let mut run = vec![self.interpreter().to_owned()];
                run.extend(self.interpreter_args.iter().cloned());
                run.push(path_string(&build_dir.join(&source_file_name)));

                BuildPlan {
                    source_file_name,
                    entry_point: SOURCE_STEM.to_owned(),
                    compile_command: None,
                    run_command: run,
                }
            }
            Language::Java => {
                let entry_point = detect_entry_point(source);
                let source_file_name = format!("{entry_point}.java");

                let mut compile = vec![self.compiler().to_owned()];
                compile.extend(self.compiler_flags.iter().cloned());
                compile.push(source_file_name.clone());

                let mut run = vec![self.interpreter().to_owned()];
                run.extend(self.interpreter_args.iter().cloned());
                run.extend(["-cp".to_owned(), path_string(build_dir), entry_point.clone()]);

                BuildPlan {
                    source_file_name,
                    entry_point,
                    compile_command: Some(compile),
                    run_command: run,
                }
            }
        }
    }
}

/// Find the public type name in Java source
///
/// This is a best-effort text scan, not a parser: comments and string
/// literals are not skipped. Falls back to [`DEFAULT_ENTRY_POINT`].
pub fn detect_entry_point(source: &str) -> String {
    JAVA_PUBLIC_TYPE
        .captures(source)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_owned())
        .unwrap_or_else(|| DEFAULT_ENTRY_POINT.to_owned())
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
