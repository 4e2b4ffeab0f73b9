use crate::types::Language;

/// An argv template, resolved relative to the workspace directory the child
/// runs in.
#[derive(Debug, Clone, Copy)]
pub struct CommandTemplate {
    pub program: &'static str,
    pub args: &'static [&'static str],
}

/// Immutable compile/run recipe for one language. One entry per supported
/// language, selected by exhaustive match, so an unsupported language can
/// never fall through at runtime.
#[derive(Debug)]
pub struct Toolchain {
    pub language: Language,
    /// Name the source file is written under inside the workspace.
    pub source_file: &'static str,
    pub compile: Option<CommandTemplate>,
    pub run: CommandTemplate,
    /// Compiled outputs, removed together with the workspace.
    pub artifacts: &'static [&'static str],
    /// True when the language dictates the entry filename (Java: a single
    /// public class whose name must equal the file name). Such languages are
    /// limited to one source file per request.
    pub fixed_entry_filename: bool,
}

static JAVASCRIPT: Toolchain = Toolchain {
    language: Language::Javascript,
    source_file: "main.js",
    compile: None,
    run: CommandTemplate {
        program: "node",
        args: &["main.js"],
    },
    artifacts: &[],
    fixed_entry_filename: false,
};

static PYTHON: Toolchain = Toolchain {
    language: Language::Python,
    source_file: "main.py",
    compile: None,
    run: CommandTemplate {
        program: "python3",
        args: &["main.py"],
    },
    artifacts: &[],
    fixed_entry_filename: false,
};

static JAVA: Toolchain = Toolchain {
    language: Language::Java,
    source_file: "Main.java",
    compile: Some(CommandTemplate {
        program: "javac",
        args: &["Main.java"],
    }),
    run: CommandTemplate {
        program: "java",
        args: &["-cp", ".", "Main"],
    },
    artifacts: &["Main.class"],
    fixed_entry_filename: true,
};

static C: Toolchain = Toolchain {
    language: Language::C,
    source_file: "main.c",
    compile: Some(CommandTemplate {
        program: "gcc",
        args: &["main.c", "-o", "main"],
    }),
    run: CommandTemplate {
        program: "./main",
        args: &[],
    },
    artifacts: &["main"],
    fixed_entry_filename: false,
};

static CPP: Toolchain = Toolchain {
    language: Language::Cpp,
    source_file: "main.cpp",
    compile: Some(CommandTemplate {
        program: "g++",
        args: &["main.cpp", "-o", "main"],
    }),
    run: CommandTemplate {
        program: "./main",
        args: &[],
    },
    artifacts: &["main"],
    fixed_entry_filename: false,
};

impl Toolchain {
    pub fn for_language(language: Language) -> &'static Toolchain {
        match language {
            Language::Javascript => &JAVASCRIPT,
            Language::Python => &PYTHON,
            Language::Java => &JAVA,
            Language::C => &C,
            Language::Cpp => &CPP,
        }
    }

    pub fn needs_compile(&self) -> bool {
        self.compile.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Language; 5] = [
        Language::Javascript,
        Language::Python,
        Language::Java,
        Language::C,
        Language::Cpp,
    ];

    #[test]
    fn table_is_keyed_consistently() {
        for language in ALL {
            assert_eq!(Toolchain::for_language(language).language, language);
        }
    }

    #[test]
    fn compiled_languages_declare_artifacts() {
        for language in ALL {
            let toolchain = Toolchain::for_language(language);
            if toolchain.needs_compile() {
                assert!(
                    !toolchain.artifacts.is_empty(),
                    "{language} compiles but declares no artifacts"
                );
            } else {
                assert!(toolchain.artifacts.is_empty());
            }
        }
    }

    #[test]
    fn java_requires_fixed_entry_filename() {
        let java = Toolchain::for_language(Language::Java);
        assert!(java.fixed_entry_filename);
        assert_eq!(java.source_file, "Main.java");
        // the class name the runner invokes must match the source file
        assert_eq!(java.run.args.last(), Some(&"Main"));
    }

    #[test]
    fn interpreted_languages_run_their_source_file() {
        for language in [Language::Javascript, Language::Python] {
            let toolchain = Toolchain::for_language(language);
            assert!(toolchain.compile.is_none());
            assert_eq!(toolchain.run.args.to_vec(), vec![toolchain.source_file]);
        }
    }
}
