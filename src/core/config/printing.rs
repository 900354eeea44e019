use crate::core::config::data::Config;
use std::fmt::Write;

impl Config {
    pub fn summary(&self) -> String {
        let mut out = String::from("Current configuration:\n");
        let _ = writeln!(out, "  server: {}:{}", self.server.host, self.server.port);
        let _ = writeln!(out, "  upstream.base_url: {}", self.upstream.base_url);
        let _ = writeln!(out, "  upstream.model: {}", self.upstream.model);
        match &self.upstream.api_key {
            Some(_) => out.push_str("  upstream.api_key: (set)\n"),
            None => out.push_str("  upstream.api_key: (unset)\n"),
        }
        match self.assistant.functions {
            true => out.push_str("  assistant.functions: on\n"),
            false => out.push_str("  assistant.functions: off\n"),
        }
        let _ = writeln!(
            out,
            "  assistant.system_prompt: {} chars",
            self.assistant.system_prompt.chars().count()
        );
        let _ = writeln!(out, "  logging.filter: {}", self.logging.filter);
        out
    }

    pub fn print_all(&self) {
        print!("{}", self.summary());
    }
}
