//! Default and external positions, and component membership.
//!
//! A component is listed exactly when its aggregate unit is non-zero. Every
//! edit recomputes the aggregate and synchronizes membership in the same
//! step, and every edit validates before it writes, so a rejected edit leaves
//! the basket as it was.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::Basket;
use crate::error::LedgerError;
use crate::math::{mul_div, mul_div_signed, Rounding};
use crate::types::Address;

/// A module's claim on a component held outside the basket's own custody.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalPosition {
    /// Signed unit per share.
    #[serde(with = "crate::math::i128_string")]
    pub unit: i128,
    /// Opaque module-defined payload.
    pub data: Vec<u8>,
}

/// Whether a [`Position`] is held directly or through a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionKind {
    Default,
    External,
}

/// Flattened view of one position, for queries and the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub component: Address,
    /// Owning module for external positions.
    pub module: Option<Address>,
    pub kind: PositionKind,
    #[serde(with = "crate::math::i128_string")]
    pub unit: i128,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub data: Vec<u8>,
}

/// What an edit did to the component list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentChange {
    /// The component was appended.
    Added,
    /// The component's aggregate reached zero and it was delisted.
    Removed,
    /// Membership did not change.
    Unchanged,
}

impl Basket {
    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Listed components, in insertion order.
    pub fn components(&self) -> &[Address] {
        &self.components
    }

    /// Whether `component` is listed.
    pub fn is_component(&self, component: &Address) -> bool {
        self.components.contains(component)
    }

    /// Default unit of `component` (0 if none).
    pub fn default_unit(&self, component: &Address) -> i128 {
        self.default_positions.get(component).copied().unwrap_or(0)
    }

    /// External unit of `component` owned by `module` (0 if none).
    pub fn external_unit(&self, component: &Address, module: &Address) -> i128 {
        self.external_position(component, module)
            .map(|position| position.unit)
            .unwrap_or(0)
    }

    /// External position of `component` owned by `module`.
    pub fn external_position(&self, component: &Address, module: &Address) -> Option<&ExternalPosition> {
        self.external_positions
            .get(component)
            .and_then(|entries| entries.get(module))
    }

    /// Modules with an external position in `component`, sorted.
    pub fn external_position_modules(&self, component: &Address) -> Vec<Address> {
        self.external_positions
            .get(component)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Default unit plus every external unit of `component`.
    pub fn aggregate_unit(&self, component: &Address) -> Result<i128, LedgerError> {
        self.external_sum(component)?
            .checked_add(self.default_unit(component))
            .ok_or(LedgerError::ArithmeticOverflow("aggregate unit"))
    }

    /// Tokens of `component` the basket owns in total, rounded down.
    pub fn real_holding(&self, component: &Address) -> Result<u128, LedgerError> {
        let aggregate = self.aggregate_unit(component)?;
        let unit = u128::try_from(aggregate).map_err(|_| {
            LedgerError::InvariantViolation(format!("negative aggregate unit for {component}"))
        })?;
        mul_div(unit, self.total_supply, self.unit_scale, Rounding::Down)
    }

    /// Tokens of `component` the basket holds directly, rounded toward zero.
    pub fn default_real_holding(&self, component: &Address) -> Result<i128, LedgerError> {
        mul_div_signed(
            self.default_unit(component),
            self.total_supply,
            self.unit_scale,
            Rounding::Down,
        )
    }

    /// Whether the default unit of `component` covers `unit`.
    pub fn has_sufficient_default_units(&self, component: &Address, unit: u128) -> bool {
        let held = self.default_unit(component);
        held >= 0 && held.unsigned_abs() >= unit
    }

    /// Every non-zero position, component by component: the default position
    /// first, then external positions by module.
    pub fn positions(&self) -> Vec<Position> {
        let mut out = Vec::new();
        for component in &self.components {
            let default = self.default_unit(component);
            if default != 0 {
                out.push(Position {
                    component: component.clone(),
                    module: None,
                    kind: PositionKind::Default,
                    unit: default,
                    data: Vec::new(),
                });
            }
            if let Some(entries) = self.external_positions.get(component) {
                for (module, position) in entries {
                    out.push(Position {
                        component: component.clone(),
                        module: Some(module.clone()),
                        kind: PositionKind::External,
                        unit: position.unit,
                        data: position.data.clone(),
                    });
                }
            }
        }
        out
    }

    /// First component in which `module` still holds a non-zero external
    /// position.
    pub fn outstanding_position_of(&self, module: &Address) -> Option<&Address> {
        self.components.iter().find(|component| {
            self.external_positions
                .get(*component)
                .and_then(|entries| entries.get(module))
                .is_some_and(|position| position.unit != 0)
        })
    }

    // -----------------------------------------------------------------------
    // Mutators
    // -----------------------------------------------------------------------

    /// Replaces the default unit of `component`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvariantViolation`] if the aggregate would go
    /// negative; [`LedgerError::InvalidArgument`] if listing the component
    /// would exceed the component limit.
    pub(crate) fn set_default_position(
        &mut self,
        component: &Address,
        unit: i128,
    ) -> Result<ComponentChange, LedgerError> {
        let aggregate = self
            .external_sum(component)?
            .checked_add(unit)
            .ok_or(LedgerError::ArithmeticOverflow("aggregate unit"))?;
        let change = self.check_membership(component, aggregate)?;

        if unit == 0 {
            self.default_positions.remove(component);
        } else {
            self.default_positions.insert(component.clone(), unit);
        }
        self.apply_membership(component, change);
        Ok(change)
    }

    /// Replaces `module`'s external position in `component`. A zero unit
    /// deletes the entry together with its data.
    pub(crate) fn set_external_position(
        &mut self,
        component: &Address,
        module: &Address,
        unit: i128,
        data: Vec<u8>,
    ) -> Result<ComponentChange, LedgerError> {
        let others = self
            .external_sum(component)?
            .checked_sub(self.external_unit(component, module))
            .ok_or(LedgerError::ArithmeticOverflow("aggregate unit"))?;
        let aggregate = others
            .checked_add(unit)
            .and_then(|sum| sum.checked_add(self.default_unit(component)))
            .ok_or(LedgerError::ArithmeticOverflow("aggregate unit"))?;
        let change = self.check_membership(component, aggregate)?;

        let entries = self.external_positions.entry(component.clone()).or_default();
        if unit == 0 {
            entries.remove(module);
        } else {
            entries.insert(module.clone(), ExternalPosition { unit, data });
        }
        if entries.is_empty() {
            self.external_positions.remove(component);
        }
        self.apply_membership(component, change);
        Ok(change)
    }

    fn external_sum(&self, component: &Address) -> Result<i128, LedgerError> {
        let Some(entries) = self.external_positions.get(component) else {
            return Ok(0);
        };
        entries.values().try_fold(0i128, |acc, position| {
            acc.checked_add(position.unit)
                .ok_or(LedgerError::ArithmeticOverflow("aggregate unit"))
        })
    }

    /// Decides what membership must become for a prospective aggregate,
    /// without writing anything.
    fn check_membership(&self, component: &Address, aggregate: i128) -> Result<ComponentChange, LedgerError> {
        if aggregate < 0 {
            return Err(LedgerError::InvariantViolation(format!(
                "aggregate unit of {component} would be {aggregate}"
            )));
        }
        let listed = self.is_component(component);
        match (aggregate == 0, listed) {
            (true, true) => Ok(ComponentChange::Removed),
            (false, false) => {
                if self.components.len() >= self.max_components {
                    return Err(LedgerError::InvalidArgument(format!(
                        "basket already holds the maximum of {} components",
                        self.max_components
                    )));
                }
                Ok(ComponentChange::Added)
            }
            _ => Ok(ComponentChange::Unchanged),
        }
    }

    fn apply_membership(&mut self, component: &Address, change: ComponentChange) {
        match change {
            ComponentChange::Added => self.components.push(component.clone()),
            ComponentChange::Removed => {
                self.components.retain(|listed| listed != component);
                // Whatever is left nets to zero; drop it so no external
                // position survives on an unlisted component.
                self.default_positions.remove(component);
                self.external_positions.remove(component);
            }
            ComponentChange::Unchanged => {
                if !self.is_component(component) {
                    self.default_positions.remove(component);
                    self.external_positions.remove(component);
                }
            }
        }
    }

    /// Aggregate unit of every listed component.
    pub fn unit_table(&self) -> BTreeMap<Address, i128> {
        let mut table = BTreeMap::new();
        for component in &self.components {
            if let Ok(aggregate) = self.aggregate_unit(component) {
                table.insert(component.clone(), aggregate);
            }
        }
        table
    }
}
