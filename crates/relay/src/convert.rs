//! Wire <-> object-model conversions at the relay boundary. `object-model`
//! has no `serde` dependency and `cluster-protocol` has no knowledge of
//! the object model, so something has to sit between them — this is it.

use cluster_protocol::{PerfdataUnit as WirePerfdataUnit, WireCheckResult, WirePerfdataValue};
use object_model::{CheckResult, PerfdataUnit, PerfdataValue};

fn unit_to_wire(unit: PerfdataUnit) -> WirePerfdataUnit {
    match unit {
        PerfdataUnit::Seconds => WirePerfdataUnit::Seconds,
        PerfdataUnit::Bytes => WirePerfdataUnit::Bytes,
        PerfdataUnit::Percent => WirePerfdataUnit::Percent,
        PerfdataUnit::Counter => WirePerfdataUnit::Counter,
        PerfdataUnit::None => WirePerfdataUnit::None,
    }
}

fn unit_from_wire(unit: WirePerfdataUnit) -> PerfdataUnit {
    match unit {
        WirePerfdataUnit::Seconds => PerfdataUnit::Seconds,
        WirePerfdataUnit::Bytes => PerfdataUnit::Bytes,
        WirePerfdataUnit::Percent => PerfdataUnit::Percent,
        WirePerfdataUnit::Counter => PerfdataUnit::Counter,
        WirePerfdataUnit::None => PerfdataUnit::None,
    }
}

pub fn perfdata_to_wire(v: &PerfdataValue) -> WirePerfdataValue {
    WirePerfdataValue {
        label: v.label.clone(),
        value: v.value,
        unit: v.unit.map(unit_to_wire),
        warn: v.warn,
        crit: v.crit,
        min: v.min,
        max: v.max,
    }
}

pub fn perfdata_from_wire(v: &WirePerfdataValue) -> PerfdataValue {
    PerfdataValue {
        label: v.label.clone(),
        value: v.value,
        unit: v.unit.map(unit_from_wire),
        warn: v.warn,
        crit: v.crit,
        min: v.min,
        max: v.max,
    }
}

pub fn check_result_to_wire(cr: &CheckResult) -> WireCheckResult {
    WireCheckResult {
        scheduled_start: cr.scheduled_start,
        execution_start: cr.execution_start,
        execution_end: cr.execution_end,
        exit_status: cr.exit_status,
        output: cr.output.clone(),
        perfdata: cr.perfdata.iter().map(perfdata_to_wire).collect(),
        schedule_end: cr.schedule_end,
        command_name: cr.command_name.clone(),
    }
}

pub fn check_result_from_wire(w: &WireCheckResult) -> CheckResult {
    CheckResult {
        scheduled_start: w.scheduled_start,
        execution_start: w.execution_start,
        execution_end: w.execution_end,
        exit_status: w.exit_status,
        output: w.output.clone(),
        perfdata: w.perfdata.iter().map(perfdata_from_wire).collect(),
        schedule_end: w.schedule_end,
        command_name: w.command_name.clone(),
    }
}
