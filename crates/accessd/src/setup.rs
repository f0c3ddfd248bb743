//! Interactive `access setup`

use access_core::traits::FieldKind;
use access_core::{DiscoveryConfig, Error, ProviderCredentials, ProviderRegistry};
use std::io::{BufRead, Write};

const DEFAULT_PREFIX: &str = "peer";

/// Collect a discovery configuration by prompting on `output` and reading
/// answers from `input`
///
/// Required answers are asked again when left empty; end of input before
/// every required answer is known is missing configuration.
pub fn prompt_config<R: BufRead, W: Write>(
    registry: &ProviderRegistry,
    input: &mut R,
    output: &mut W,
) -> anyhow::Result<DiscoveryConfig> {
    let mut prompter = Prompter { input, output };

    let domain = prompter.required("Discovery domain (e.g. swarm.example.com)")?;
    let prefix = prompter.optional("Host prefix", Some(DEFAULT_PREFIX))?;

    let names = registry.list_providers();
    writeln!(prompter.output, "Available DNS providers: {}", names.join(", "))?;
    let provider = loop {
        let answer = prompter.required("DNS provider")?.to_ascii_lowercase();
        if registry.has_provider(&answer) {
            break answer;
        }
        writeln!(prompter.output, "Unknown provider '{}'", answer)?;
    };

    let (_, schema) = registry.describe(&provider)?;
    let mut credentials = ProviderCredentials::default();
    for field in schema {
        let label = match field.kind {
            FieldKind::Secret => format!("{} (secret)", field.description),
            FieldKind::Text => field.description.to_string(),
        };
        let value = if field.required {
            Some(prompter.required(&label)?)
        } else {
            prompter.optional(&label, field.default)?
        };
        if let Some(value) = value {
            credentials.set(field.name, value);
        }
    }

    let config = DiscoveryConfig::new(
        domain,
        prefix.unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
        provider,
        credentials,
    );
    config.validate()?;
    Ok(config)
}

struct Prompter<'a, R, W> {
    input: &'a mut R,
    output: &'a mut W,
}

impl<R: BufRead, W: Write> Prompter<'_, R, W> {
    fn ask(&mut self, label: &str, default: Option<&str>) -> anyhow::Result<Option<String>> {
        match default {
            Some(default) => write!(self.output, "{} [{}]: ", label, default)?,
            None => write!(self.output, "{}: ", label)?,
        }
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(Error::config_missing(format!("no answer for '{}'", label)).into());
        }
        let answer = line.trim();
        Ok((!answer.is_empty()).then(|| answer.to_string()))
    }

    fn required(&mut self, label: &str) -> anyhow::Result<String> {
        loop {
            if let Some(answer) = self.ask(label, None)? {
                return Ok(answer);
            }
        }
    }

    fn optional(&mut self, label: &str, default: Option<&str>) -> anyhow::Result<Option<String>> {
        Ok(self
            .ask(label, default)?
            .or_else(|| default.map(str::to_string)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn registry() -> ProviderRegistry {
        let registry = ProviderRegistry::new();
        access_providers::register_all(&registry);
        registry
    }

    fn run(answers: &str) -> anyhow::Result<DiscoveryConfig> {
        let mut input = Cursor::new(answers.as_bytes().to_vec());
        let mut output = Vec::new();
        prompt_config(&registry(), &mut input, &mut output)
    }

    #[test]
    fn collects_provider_fields_in_schema_order() {
        let config = run("swarm.example.com\n\ndigitalocean\ndo-token\n\n").unwrap();

        assert_eq!(config.domain, "swarm.example.com");
        assert_eq!(config.host_prefix, "peer");
        assert_eq!(config.dns_provider, "digitalocean");
        assert_eq!(config.dns_key, "do-token");
        assert_eq!(config.dns_extra.get("ttl").map(String::as_str), Some("300"));
        assert!(config.enable_auto_sync);
    }

    #[test]
    fn unknown_provider_and_empty_answers_are_asked_again() {
        let config = run("\nswarm.example.com\nnode\nbind\ntest\n\n\n").unwrap();

        assert_eq!(config.host_prefix, "node");
        assert_eq!(config.dns_provider, "test");
    }

    #[test]
    fn end_of_input_is_missing_configuration() {
        let err = run("swarm.example.com\npeer\ngodaddy\nkey-only\n").unwrap_err();
        let core = err.downcast_ref::<Error>().unwrap();
        assert!(matches!(core, Error::ConfigMissing(_)));
        assert_eq!(core.exit_code(), 6);
    }

    #[test]
    fn invalid_domain_is_rejected_after_prompting() {
        let err = run("not a domain\n\ntest\n\n\n").unwrap_err();
        assert_eq!(err.downcast_ref::<Error>().map(Error::exit_code), Some(6));
    }
}
