use crate::config::LaunchboxConfig;
use crate::descriptor::LaunchDescriptor;
use crate::validation::rules::{
    LockPresentRule, PinnedBaseImageRule, PortConsistencyRule, RequiredFieldsRule,
    ValidAppRefRule, ValidPackageNamesRule, ValidationRule,
};
use anyhow::Result;

pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: Vec<Box<dyn ValidationRule>>) -> Self {
        Self { rules }
    }

    /// Default rules, plus [`LockPresentRule`] when the configuration requires a lock
    pub fn for_config(config: &LaunchboxConfig) -> Self {
        let mut validator = Self::default();
        if config.require_lock {
            validator.rules.push(Box::new(LockPresentRule));
        }
        validator
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|rule| rule.name()).collect()
    }

    pub fn validate(&self, descriptor: &LaunchDescriptor) -> Result<()> {
        for rule in &self.rules {
            if let Err(e) = rule.validate(descriptor) {
                anyhow::bail!("[{}] {}", rule.name(), e);
            }
        }
        Ok(())
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self {
            rules: vec![
                Box::new(RequiredFieldsRule),
                Box::new(PinnedBaseImageRule),
                Box::new(PortConsistencyRule),
                Box::new(ValidAppRefRule),
                Box::new(ValidPackageNamesRule),
            ],
        }
    }
}
