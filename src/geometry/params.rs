//! Optimization parameter registry.
//!
//! Every free numeric value of a geometry lives here, addressed by a `ParamId`.
//! A parameter carries:
//!
//! - a unique label (for reports and activation by name)
//! - its kind (position / radius / shape coefficient)
//! - a group name (the design part it belongs to)
//! - an active flag: only active parameters are seen by optimizers
//!
//! Activation is mutable between optimization stages; values are mutated by
//! optimizers through `set_active_values`.

use std::collections::HashSet;
use std::fmt;

use crate::domain::ParamKind;
use crate::error::AppError;

/// Index of a parameter inside its `OptimParams`.
pub type ParamId = usize;

/// A geometric value: either a constant or a reference to a parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Fixed(f64),
    Param(ParamId),
}

impl Value {
    pub fn get(&self, params: &OptimParams) -> f64 {
        match *self {
            Value::Fixed(v) => v,
            Value::Param(id) => params.value(id),
        }
    }

    pub fn param_id(&self) -> Option<ParamId> {
        match *self {
            Value::Fixed(_) => None,
            Value::Param(id) => Some(id),
        }
    }

    pub fn is_param(&self) -> bool {
        matches!(self, Value::Param(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub label: String,
    pub value: f64,
    pub kind: ParamKind,
    pub group: String,
    pub active: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptimParams {
    params: Vec<Param>,
}

impl OptimParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new (active) parameter.
    pub fn add(
        &mut self,
        label: impl Into<String>,
        value: f64,
        kind: ParamKind,
        group: impl Into<String>,
    ) -> Result<ParamId, AppError> {
        let label = label.into();
        if self.params.iter().any(|p| p.label == label) {
            return Err(AppError::config(format!("Duplicate parameter label '{label}'.")));
        }
        if !value.is_finite() {
            return Err(AppError::config(format!("Parameter '{label}' has non-finite value {value}.")));
        }
        self.params.push(Param {
            label,
            value,
            kind,
            group: group.into(),
            active: true,
        });
        Ok(self.params.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn get(&self, id: ParamId) -> Option<&Param> {
        self.params.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Param> {
        self.params.iter()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.params.iter().map(|p| p.label.as_str()).collect()
    }

    pub fn id_of(&self, label: &str) -> Option<ParamId> {
        self.params.iter().position(|p| p.label == label)
    }

    /// Current value of a parameter (NaN for an unknown id).
    pub fn value(&self, id: ParamId) -> f64 {
        self.params.get(id).map(|p| p.value).unwrap_or(f64::NAN)
    }

    pub fn set_value(&mut self, id: ParamId, value: f64) -> Result<(), AppError> {
        let param = self
            .params
            .get_mut(id)
            .ok_or_else(|| AppError::config(format!("Unknown parameter index {id}.")))?;
        param.value = value;
        Ok(())
    }

    pub fn set_active(&mut self, id: ParamId, active: bool) -> Result<(), AppError> {
        let param = self
            .params
            .get_mut(id)
            .ok_or_else(|| AppError::config(format!("Unknown parameter index {id}.")))?;
        param.active = active;
        Ok(())
    }

    pub fn active_ids(&self) -> Vec<ParamId> {
        self.params
            .iter()
            .enumerate()
            .filter(|(_, p)| p.active)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.params.iter().filter(|p| p.active).count()
    }

    pub fn active_values(&self) -> Vec<f64> {
        self.params.iter().filter(|p| p.active).map(|p| p.value).collect()
    }

    /// Overwrite the active parameters, in registry order.
    pub fn set_active_values(&mut self, values: &[f64]) -> Result<(), AppError> {
        let n_active = self.active_count();
        if values.len() != n_active {
            return Err(AppError::config(format!(
                "Expected {n_active} active parameter values, got {}.",
                values.len()
            )));
        }
        for (p, &v) in self.params.iter_mut().filter(|p| p.active).zip(values) {
            p.value = v;
        }
        Ok(())
    }

    /// Activate exactly the given indices; every other parameter is deactivated.
    pub fn set_active_indices(&mut self, ids: &[ParamId]) -> Result<(), AppError> {
        let wanted: HashSet<ParamId> = ids.iter().copied().collect();
        if let Some(bad) = wanted.iter().find(|&&i| i >= self.params.len()) {
            return Err(AppError::config(format!(
                "Parameter index {bad} out of range (have {}).",
                self.params.len()
            )));
        }
        for (i, p) in self.params.iter_mut().enumerate() {
            p.active = wanted.contains(&i);
        }
        Ok(())
    }

    /// Change the activation of the named parameters only.
    pub fn set_activation_by_label(&mut self, labels: &[&str], active: bool) -> Result<(), AppError> {
        let mut ids = Vec::with_capacity(labels.len());
        for label in labels {
            let id = self
                .id_of(label)
                .ok_or_else(|| AppError::config(format!("Unknown parameter label '{label}'.")))?;
            ids.push(id);
        }
        for id in ids {
            self.params[id].active = active;
        }
        Ok(())
    }

    /// Change the activation of every parameter of the given kind.
    pub fn set_activation_by_kind(&mut self, kind: ParamKind, active: bool) {
        for p in self.params.iter_mut().filter(|p| p.kind == kind) {
            p.active = active;
        }
    }

    /// Change the activation of every parameter of a group.
    pub fn set_activation_by_group(&mut self, group: &str, active: bool) -> Result<(), AppError> {
        let mut found = false;
        for p in self.params.iter_mut().filter(|p| p.group == group) {
            p.active = active;
            found = true;
        }
        if !found {
            return Err(AppError::config(format!("Unknown parameter group '{group}'.")));
        }
        Ok(())
    }

    /// Activate the parameters matching `pred` and deactivate the others.
    pub fn activate_only(&mut self, pred: impl Fn(ParamId, &Param) -> bool) {
        for i in 0..self.params.len() {
            let keep = pred(i, &self.params[i]);
            self.params[i].active = keep;
        }
    }

    /// Copy of every value, for `restore`.
    pub fn snapshot(&self) -> Vec<f64> {
        self.params.iter().map(|p| p.value).collect()
    }

    pub fn restore(&mut self, values: &[f64]) -> Result<(), AppError> {
        if values.len() != self.params.len() {
            return Err(AppError::config(format!(
                "Snapshot has {} values, registry has {} parameters.",
                values.len(),
                self.params.len()
            )));
        }
        for (p, &v) in self.params.iter_mut().zip(values) {
            p.value = v;
        }
        Ok(())
    }
}

impl fmt::Display for OptimParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>4}  {:<24} {:<9} {:<10} {:>14}  active", "#", "label", "kind", "group", "value")?;
        for (i, p) in self.params.iter().enumerate() {
            writeln!(
                f,
                "{:>4}  {:<24} {:<9} {:<10} {:>14.6e}  {}",
                i,
                p.label,
                p.kind.label(),
                p.group,
                p.value,
                if p.active { "yes" } else { "no" }
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> OptimParams {
        let mut p = OptimParams::new();
        p.add("node1_pos", 0.5, ParamKind::Position, "part0").unwrap();
        p.add("node0_radius", 5e-3, ParamKind::Radius, "part0").unwrap();
        p.add("node1_radius", 6e-3, ParamKind::Radius, "part1").unwrap();
        p.add("bore0_alpha", 0.7, ParamKind::Shape, "part1").unwrap();
        p
    }

    #[test]
    fn duplicate_labels_are_rejected() {
        let mut p = sample();
        let err = p.add("node1_pos", 1.0, ParamKind::Position, "part0").unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn activation_by_kind_and_label() {
        let mut p = sample();
        p.set_activation_by_kind(ParamKind::Position, false);
        assert_eq!(p.active_values(), vec![5e-3, 6e-3, 0.7]);

        p.set_activation_by_label(&["bore0_alpha", "node0_radius"], false).unwrap();
        assert_eq!(p.active_values(), vec![6e-3]);
        assert!(p.set_activation_by_label(&["missing"], false).is_err());
    }

    #[test]
    fn activation_by_group_and_indices() {
        let mut p = sample();
        p.set_activation_by_group("part1", false).unwrap();
        assert_eq!(p.active_ids(), vec![0, 1]);
        assert!(p.set_activation_by_group("nope", true).is_err());

        p.set_active_indices(&[3]).unwrap();
        assert_eq!(p.active_ids(), vec![3]);
        assert!(p.set_active_indices(&[9]).is_err());
    }

    #[test]
    fn set_active_values_writes_in_order() {
        let mut p = sample();
        p.set_active_indices(&[1, 3]).unwrap();
        p.set_active_values(&[1.0, 2.0]).unwrap();
        assert_eq!(p.snapshot(), vec![0.5, 1.0, 6e-3, 2.0]);
        assert!(p.set_active_values(&[1.0]).is_err());
    }

    #[test]
    fn snapshot_restore_round_trip() {
        let mut p = sample();
        let snap = p.snapshot();
        p.set_active_values(&[9.0, 9.0, 9.0, 9.0]).unwrap();
        p.restore(&snap).unwrap();
        assert_eq!(p.snapshot(), snap);
    }
}
