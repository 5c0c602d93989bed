use crate::config::types::{JudgeError, Result};
use crate::judge::adapter::JudgeAdapter;
use crate::judge::languages::{python::PythonAdapter, rust::RustAdapter, shell::ShellAdapter};

pub fn adapter_for(language: &str) -> Result<Box<dyn JudgeAdapter>> {
    match language {
        "rust" | "rs" => Ok(Box::new(RustAdapter::from_env())),
        "python" | "py" => Ok(Box::new(PythonAdapter)),
        "shell" | "sh" => Ok(Box::new(ShellAdapter)),
        _ => Err(JudgeError::Config(format!(
            "unsupported language adapter: {language}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_languages_resolve() {
        assert_eq!(adapter_for("rust").unwrap().language(), "rust");
        assert_eq!(adapter_for("py").unwrap().language(), "python");
        assert_eq!(adapter_for("sh").unwrap().language(), "shell");
    }

    #[test]
    fn test_unknown_language_is_config_error() {
        assert!(matches!(adapter_for("cobol"), Err(JudgeError::Config(_))));
    }
}
