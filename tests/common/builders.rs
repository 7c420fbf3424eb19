//! Test data builders for creating test objects

use varlog_rs::{
    config::{TriggerSettings, VariableGroupLink},
    Sample, SampleGroup, Variable, VariableType,
};

/// Builder for a linked variable group
pub struct GroupLinkBuilder {
    id: String,
    name: String,
    variables: Vec<Variable>,
    trigger: TriggerSettings,
}

impl GroupLinkBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            id: format!("{}-id", name),
            name: name.to_string(),
            variables: Vec::new(),
            trigger: TriggerSettings::default(),
        }
    }

    pub fn variable(mut self, name: &str, var_type: VariableType) -> Self {
        self.variables.push(Variable::new(name, var_type));
        self
    }

    pub fn trigger(mut self, trigger: TriggerSettings) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn build(self) -> VariableGroupLink {
        VariableGroupLink::new(self.id, self.name)
            .with_variables(self.variables)
            .with_trigger(self.trigger)
    }
}

/// Builder for sample groups sharing one timestamp
pub struct SampleGroupBuilder {
    groupname: String,
    x: f64,
    first: bool,
    samples: Vec<Sample>,
}

impl SampleGroupBuilder {
    pub fn new(groupname: &str, x: f64) -> Self {
        Self {
            groupname: groupname.to_string(),
            x,
            first: false,
            samples: Vec::new(),
        }
    }

    pub fn value(mut self, y: f64) -> Self {
        self.samples.push(Sample::new(self.x, y));
        self
    }

    pub fn gap(mut self) -> Self {
        self.samples.push(Sample::gap(self.x));
        self
    }

    pub fn first(mut self) -> Self {
        self.first = true;
        self
    }

    pub fn build(self) -> SampleGroup {
        SampleGroup::new(self.groupname, self.samples).with_first(self.first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_group_builder() {
        let group = SampleGroupBuilder::new("motor", 5.0).value(1.0).gap().first().build();
        assert!(group.first);
        assert_eq!(group.samples.len(), 2);
        assert_eq!(group.samples[1].value(), None);
    }
}
