//! Source languages known to the code splitter and their separators.
//!
//! Separators run from coarse to fine: top-level declarations, then
//! control-flow keywords at line start, then blank line, line, word and
//! finally single characters.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Python,
    Rust,
    Go,
    Java,
    Kotlin,
    Scala,
    Swift,
    Cpp,
    CSharp,
    JavaScript,
    TypeScript,
    Php,
    Ruby,
    Lua,
    Haskell,
    Proto,
    Solidity,
    Html,
}

impl Language {
    /// Language for a file extension (without the dot), if it has its own
    /// separators.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let lang = match ext.to_ascii_lowercase().as_str() {
            "py" => Language::Python,
            "rs" => Language::Rust,
            "go" => Language::Go,
            "java" => Language::Java,
            "kt" => Language::Kotlin,
            "scala" => Language::Scala,
            "swift" => Language::Swift,
            "c" | "cpp" | "cc" | "h" | "hpp" => Language::Cpp,
            "cs" => Language::CSharp,
            "js" | "jsx" => Language::JavaScript,
            "ts" | "tsx" => Language::TypeScript,
            "php" => Language::Php,
            "rb" => Language::Ruby,
            "lua" => Language::Lua,
            "hs" => Language::Haskell,
            "proto" => Language::Proto,
            "sol" => Language::Solidity,
            "html" | "htm" => Language::Html,
            _ => return None,
        };
        Some(lang)
    }

    /// Language for a configuration name such as `"python"` or `"cpp"`.
    pub fn from_name(name: &str) -> Option<Self> {
        let lang = match name.to_ascii_lowercase().as_str() {
            "python" => Language::Python,
            "rust" => Language::Rust,
            "go" => Language::Go,
            "java" => Language::Java,
            "kotlin" => Language::Kotlin,
            "scala" => Language::Scala,
            "swift" => Language::Swift,
            "c" | "cpp" => Language::Cpp,
            "csharp" => Language::CSharp,
            "js" | "javascript" => Language::JavaScript,
            "ts" | "typescript" => Language::TypeScript,
            "php" => Language::Php,
            "ruby" => Language::Ruby,
            "lua" => Language::Lua,
            "haskell" => Language::Haskell,
            "proto" => Language::Proto,
            "sol" | "solidity" => Language::Solidity,
            "html" => Language::Html,
            _ => return None,
        };
        Some(lang)
    }

    /// Language for a repository path. Files with no dedicated separators
    /// (shell, SQL, CSS and the like) use Python's.
    pub fn detect(path: &str) -> Self {
        std::path::Path::new(path)
            .extension()
            .and_then(|e| Self::from_extension(&e.to_string_lossy()))
            .unwrap_or(Language::Python)
    }

    pub fn separators(self) -> &'static [&'static str] {
        match self {
            Language::Python => &["\nclass ", "\ndef ", "\n\tdef ", "\n\n", "\n", " ", ""],
            Language::Rust => &[
                "\nfn ", "\nconst ", "\nlet ", "\nif ", "\nwhile ", "\nfor ", "\nloop ",
                "\nmatch ", "\n\n", "\n", " ", "",
            ],
            Language::Go => &[
                "\nfunc ", "\nvar ", "\nconst ", "\ntype ", "\nif ", "\nfor ", "\nswitch ",
                "\ncase ", "\n\n", "\n", " ", "",
            ],
            Language::Java => &[
                "\nclass ", "\npublic ", "\nprotected ", "\nprivate ", "\nstatic ", "\nif ",
                "\nfor ", "\nwhile ", "\nswitch ", "\ncase ", "\n\n", "\n", " ", "",
            ],
            Language::Kotlin => &[
                "\nclass ", "\npublic ", "\nprotected ", "\nprivate ", "\ninternal ",
                "\ncompanion ", "\nfun ", "\nval ", "\nvar ", "\nif ", "\nfor ", "\nwhile ",
                "\nwhen ", "\ncase ", "\nelse ", "\n\n", "\n", " ", "",
            ],
            Language::Scala => &[
                "\nclass ", "\nobject ", "\ndef ", "\nval ", "\nvar ", "\nif ", "\nfor ",
                "\nwhile ", "\nmatch ", "\ncase ", "\n\n", "\n", " ", "",
            ],
            Language::Swift => &[
                "\nfunc ", "\nclass ", "\nstruct ", "\nenum ", "\nif ", "\nfor ", "\nwhile ",
                "\ndo ", "\nswitch ", "\ncase ", "\n\n", "\n", " ", "",
            ],
            Language::Cpp => &[
                "\nclass ", "\nvoid ", "\nint ", "\nfloat ", "\ndouble ", "\nif ", "\nfor ",
                "\nwhile ", "\nswitch ", "\ncase ", "\n\n", "\n", " ", "",
            ],
            Language::CSharp => &[
                "\ninterface ", "\nenum ", "\nimplements ", "\ndelegate ", "\nevent ",
                "\nclass ", "\nabstract ", "\npublic ", "\nprotected ", "\nprivate ",
                "\nstatic ", "\nreturn ", "\nif ", "\ncontinue ", "\nfor ", "\nforeach ",
                "\nwhile ", "\nswitch ", "\nbreak ", "\ncase ", "\nelse ", "\ntry ", "\nthrow ",
                "\nfinally ", "\ncatch ", "\n\n", "\n", " ", "",
            ],
            Language::JavaScript => &[
                "\nfunction ", "\nconst ", "\nlet ", "\nvar ", "\nclass ", "\nif ", "\nfor ",
                "\nwhile ", "\nswitch ", "\ncase ", "\ndefault ", "\n\n", "\n", " ", "",
            ],
            Language::TypeScript => &[
                "\nenum ", "\ninterface ", "\nnamespace ", "\ntype ", "\nclass ",
                "\nfunction ", "\nconst ", "\nlet ", "\nvar ", "\nif ", "\nfor ", "\nwhile ",
                "\nswitch ", "\ncase ", "\ndefault ", "\n\n", "\n", " ", "",
            ],
            Language::Php => &[
                "\nfunction ", "\nclass ", "\nif ", "\nforeach ", "\nwhile ", "\ndo ",
                "\nswitch ", "\ncase ", "\n\n", "\n", " ", "",
            ],
            Language::Ruby => &[
                "\ndef ", "\nclass ", "\nif ", "\nunless ", "\nwhile ", "\nfor ", "\ndo ",
                "\nbegin ", "\nrescue ", "\n\n", "\n", " ", "",
            ],
            Language::Lua => &[
                "\nlocal ", "\nfunction ", "\nif ", "\nfor ", "\nwhile ", "\nrepeat ", "\n\n",
                "\n", " ", "",
            ],
            Language::Haskell => &[
                "\nmain :: ", "\nmain = ", "\nlet ", "\nin ", "\ndo ", "\nwhere ", "\n:: ",
                "\n= ", "\ndata ", "\nnewtype ", "\ntype ", "\nmodule ", "\nimport ",
                "\nqualified ", "\nclass ", "\ninstance ", "\ncase ", "\n| ", "\n\n", "\n", " ",
                "",
            ],
            Language::Proto => &[
                "\nmessage ", "\nservice ", "\nenum ", "\noption ", "\nimport ", "\nsyntax ",
                "\n\n", "\n", " ", "",
            ],
            Language::Solidity => &[
                "\npragma ", "\nusing ", "\ncontract ", "\ninterface ", "\nlibrary ",
                "\nconstructor ", "\ntype ", "\nfunction ", "\nevent ", "\nmodifier ",
                "\nerror ", "\nstruct ", "\nenum ", "\nif ", "\nfor ", "\nwhile ",
                "\ndo while ", "\nassembly ", "\n\n", "\n", " ", "",
            ],
            Language::Html => &[
                "<body", "<div", "<p", "<br", "<li", "<h1", "<h2", "<h3", "<h4", "<h5", "<h6",
                "<span", "<table", "<tr", "<td", "<th", "<ul", "<ol", "<header", "<footer",
                "<nav", "<head", "<style", "<script", "<meta", "<title", "",
            ],
        }
    }
}
