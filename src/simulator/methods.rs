//! Extrinsic methods of the simulated configuration services
//!
//! Every mutating method either succeeds, starting a job (or returning 0 in
//! synchronous mode), or is refused by the array, which surfaces as a job
//! ending in EXCEPTION with an `ErrorDescription`.

use super::{system_path, ArrayState, FRONT_END_PORT};
use crate::domain::model::{classes, GroupKind, HardwareIdType, JobState, ServiceKind};
use crate::domain::ports::{CimValue, InvokeOutput, ObjectPath, ParamValue};
use crate::error::{Error, Result};

/// Return code of a method that started a job
pub(super) const JOB_STARTED: u32 = 4096;

#[derive(Debug, Default)]
struct Outcome {
    out_params: Vec<ParamValue>,
    /// Only returned when the method completes inline
    sync_params: Vec<ParamValue>,
    /// Objects the job is associated with
    results: Vec<ObjectPath>,
}

enum Reply {
    Done(Outcome),
    Refused(String),
}

struct Args<'a> {
    method: &'a str,
    params: &'a [ParamValue],
}

impl<'a> Args<'a> {
    fn value(&self, name: &str) -> Result<&'a CimValue> {
        self.params
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .map(|p| &p.value)
            .ok_or_else(|| self.invalid(name))
    }

    fn string(&self, name: &str) -> Result<&'a str> {
        self.value(name)?.as_str().ok_or_else(|| self.invalid(name))
    }

    fn int(&self, name: &str) -> Result<i64> {
        self.value(name)?.as_i64().ok_or_else(|| self.invalid(name))
    }

    fn flag(&self, name: &str) -> bool {
        self.value(name)
            .ok()
            .and_then(CimValue::as_bool)
            .unwrap_or(false)
    }

    fn reference(&self, name: &str) -> Result<&'a ObjectPath> {
        self.value(name)?
            .as_reference()
            .ok_or_else(|| self.invalid(name))
    }

    fn references(&self, name: &str) -> Result<Vec<&'a ObjectPath>> {
        self.value(name)?
            .as_array()
            .ok_or_else(|| self.invalid(name))?
            .iter()
            .map(|v| v.as_reference().ok_or_else(|| self.invalid(name)))
            .collect()
    }

    fn invalid(&self, name: &str) -> Error {
        Error::Transport(format!(
            "CIM_ERR_INVALID_PARAMETER: {} of {}",
            name, self.method
        ))
    }
}

pub(super) fn invoke(
    state: &mut ArrayState,
    target: &ObjectPath,
    method: &str,
    params: &[ParamValue],
) -> Result<InvokeOutput> {
    if !state.objects.contains_key(target) {
        return Err(Error::Transport(format!("CIM_ERR_NOT_FOUND: {}", target)));
    }
    let system_name = target
        .key("SystemName")
        .map_err(|_| Error::Transport(format!("CIM_ERR_INVALID_PARAMETER: {} is not a service", target)))?
        .to_string();
    let args = Args { method, params };

    let service = [
        ServiceKind::StorageConfiguration,
        ServiceKind::ControllerConfiguration,
        ServiceKind::HardwareIdManagement,
    ]
    .into_iter()
    .find(|kind| state.is_a(target, kind.class_name()));

    if service == Some(ServiceKind::HardwareIdManagement) && method == "EMCGetTargetEndpoints" {
        return target_endpoints(state, &args);
    }

    let script = state.next_script();
    let commit = state.synchronous || script.last() == Some(&JobState::Completed);

    let reply = match (service, method) {
        (Some(ServiceKind::ControllerConfiguration), "CreateGroup") => {
            create_group(state, &system_name, &args, commit)?
        }
        (Some(ServiceKind::ControllerConfiguration), "DeleteGroup") => {
            delete_group(state, &args, commit)?
        }
        (Some(ServiceKind::ControllerConfiguration), "AddMembers") => {
            change_members(state, &args, commit, true)?
        }
        (Some(ServiceKind::ControllerConfiguration), "RemoveMembers") => {
            change_members(state, &args, commit, false)?
        }
        (Some(ServiceKind::ControllerConfiguration), "CreateMaskingView") => {
            create_masking_view(state, &system_name, &args, commit)?
        }
        (Some(ServiceKind::ControllerConfiguration), "DeleteMaskingView") => {
            delete_masking_view(state, &args, commit)?
        }
        (Some(ServiceKind::StorageConfiguration), "CreateOrModifyElementFromStoragePool") => {
            create_volume(state, &system_name, &args, commit)?
        }
        (Some(ServiceKind::StorageConfiguration), "ReturnToStoragePool") => {
            return_to_pool(state, &args, commit)?
        }
        (Some(ServiceKind::HardwareIdManagement), "CreateStorageHardwareID") => {
            create_hardware_id(state, &system_name, &args, commit)?
        }
        (Some(ServiceKind::HardwareIdManagement), "DeleteStorageHardwareID") => {
            delete_hardware_id(state, &args, commit)?
        }
        _ => {
            return Err(Error::Transport(format!(
                "CIM_ERR_METHOD_NOT_AVAILABLE: {} on {}",
                method,
                target.class_name()
            )))
        }
    };

    Ok(match reply {
        Reply::Done(outcome) => complete(state, outcome, script, commit),
        Reply::Refused(description) => refuse(state, description),
    })
}

fn complete(
    state: &mut ArrayState,
    outcome: Outcome,
    script: Vec<JobState>,
    commit: bool,
) -> InvokeOutput {
    if state.synchronous {
        let mut out_params = outcome.out_params;
        out_params.extend(outcome.sync_params);
        return InvokeOutput {
            return_code: 0,
            out_params,
        };
    }

    let job = state.start_job(script, Some("job did not complete".into()));
    if commit {
        for result in &outcome.results {
            state.link(super::ASSOC_AFFECTED_JOB, "AffectingElement", &job, "AffectedElement", result);
        }
    }
    let mut out_params = outcome.out_params;
    if !state.drop_job_refs {
        out_params.push(ParamValue::new("Job", job));
    }
    InvokeOutput {
        return_code: JOB_STARTED,
        out_params,
    }
}

fn refuse(state: &mut ArrayState, description: String) -> InvokeOutput {
    let job = state.start_job(
        vec![JobState::Running, JobState::Exception],
        Some(description),
    );
    let mut out_params = Vec::new();
    if !state.drop_job_refs {
        out_params.push(ParamValue::new("Job", job));
    }
    InvokeOutput {
        return_code: JOB_STARTED,
        out_params,
    }
}

// =============================================================================
// Controller Configuration Service
// =============================================================================

fn create_group(
    state: &mut ArrayState,
    system_name: &str,
    args: &Args<'_>,
    commit: bool,
) -> Result<Reply> {
    let name = args.string("GroupName")?;
    let kind = GroupKind::from_code(args.int("Type")?).map_err(|_| args.invalid("Type"))?;
    let group = ArrayState::group_path(system_name, kind, name);
    if state.objects.contains_key(&group) {
        return Ok(Reply::Refused(format!("{} group {} already exists", kind, name)));
    }
    if commit {
        state.add_group(&system_path(system_name), kind, name);
    }
    Ok(Reply::Done(Outcome {
        out_params: vec![ParamValue::new("MaskingGroup", group.clone())],
        results: vec![group],
        ..Default::default()
    }))
}

fn delete_group(state: &mut ArrayState, args: &Args<'_>, commit: bool) -> Result<Reply> {
    let group = args.reference("MaskingGroup")?;
    let force = args.flag("Force");
    if !state.objects.contains_key(group) {
        return Ok(Reply::Refused(format!("no such group {}", group)));
    }
    if let Some(view) = state.views_of_group(group).first() {
        return Ok(Reply::Refused(format!(
            "group is part of masking view {}",
            view.key("DeviceID").unwrap_or_default()
        )));
    }
    let members = state.members(group).len();
    if members > 0 && !force {
        return Ok(Reply::Refused(format!(
            "group has {} members and Force was not set",
            members
        )));
    }
    if commit {
        state.remove(group);
    }
    Ok(Reply::Done(Outcome::default()))
}

fn member_allowed(state: &ArrayState, kind: GroupKind, member: &ObjectPath) -> bool {
    match kind {
        GroupKind::Storage => state.is_a(member, classes::STORAGE_VOLUME),
        GroupKind::Port => state.is_a(member, FRONT_END_PORT),
        GroupKind::Initiator => state.is_a(member, classes::HARDWARE_ID),
    }
}

fn change_members(
    state: &mut ArrayState,
    args: &Args<'_>,
    commit: bool,
    add: bool,
) -> Result<Reply> {
    let group = args.reference("MaskingGroup")?;
    let members = args.references("Members")?;
    let kind = match GroupKind::of_class(group.class_name()) {
        Some(kind) if state.objects.contains_key(group) => kind,
        _ => return Ok(Reply::Refused(format!("no such group {}", group))),
    };
    let current = state.members(group);
    for member in &members {
        if !state.objects.contains_key(*member) {
            return Ok(Reply::Refused(format!("no such element {}", member)));
        }
        if add && !member_allowed(state, kind, member) {
            return Ok(Reply::Refused(format!(
                "{} cannot be a member of a {} group",
                member.class_name(),
                kind
            )));
        }
        if !add && !current.contains(*member) {
            return Ok(Reply::Refused(format!("{} is not a member of the group", member)));
        }
    }
    if commit {
        for member in members {
            if add {
                state.add_member(group, member);
            } else {
                state.unlink(super::ASSOC_MEMBER_OF, group, member);
            }
        }
    }
    Ok(Reply::Done(Outcome {
        results: vec![group.clone()],
        ..Default::default()
    }))
}

fn create_masking_view(
    state: &mut ArrayState,
    system_name: &str,
    args: &Args<'_>,
    commit: bool,
) -> Result<Reply> {
    let name = args.string("ElementName")?;
    let groups = [
        (args.reference("DeviceMaskingGroup")?, GroupKind::Storage),
        (args.reference("InitiatorMaskingGroup")?, GroupKind::Initiator),
        (args.reference("TargetMaskingGroup")?, GroupKind::Port),
    ];
    for (group, kind) in &groups {
        if !state.objects.contains_key(*group) || !group.is_class(kind.class_name()) {
            return Ok(Reply::Refused(format!("{} is not a {} group", group, kind)));
        }
    }
    let view = ArrayState::view_path(system_name, name);
    if state.objects.contains_key(&view) {
        return Ok(Reply::Refused(format!("masking view {} already exists", name)));
    }
    if commit {
        state.add_masking_view(
            &system_path(system_name),
            name,
            [groups[0].0, groups[1].0, groups[2].0],
        );
    }
    Ok(Reply::Done(Outcome {
        sync_params: vec![ParamValue::new("ProtocolController", view.clone())],
        results: vec![view],
        ..Default::default()
    }))
}

fn delete_masking_view(state: &mut ArrayState, args: &Args<'_>, commit: bool) -> Result<Reply> {
    let view = args.reference("ProtocolController")?;
    if !state.objects.contains_key(view) {
        return Ok(Reply::Refused(format!("no such masking view {}", view)));
    }
    if commit {
        state.remove(view);
    }
    Ok(Reply::Done(Outcome::default()))
}

// =============================================================================
// Storage Configuration Service
// =============================================================================

fn create_volume(
    state: &mut ArrayState,
    system_name: &str,
    args: &Args<'_>,
    commit: bool,
) -> Result<Reply> {
    let name = args.string("ElementName")?;
    let size = args.int("Size")?;
    let pool = args.reference("InPool")?;
    if !state.objects.contains_key(pool) {
        return Ok(Reply::Refused(format!("no such pool {}", pool)));
    }
    if size <= 0 {
        return Ok(Reply::Refused(format!("invalid size {}", size)));
    }
    let device_id = format!("{:05X}", state.next_device_id);
    let volume = if commit {
        state.next_device_id += 1;
        state.add_volume(&system_path(system_name), &device_id, name, Some(pool), size)
    } else {
        ObjectPath::new(super::VOLUME).with_key("DeviceID", device_id)
    };
    Ok(Reply::Done(Outcome {
        sync_params: vec![ParamValue::new("TheElement", volume.clone())],
        results: vec![volume],
        ..Default::default()
    }))
}

fn return_to_pool(state: &mut ArrayState, args: &Args<'_>, commit: bool) -> Result<Reply> {
    let volume = args.reference("TheElement")?;
    if !state.objects.contains_key(volume) {
        return Ok(Reply::Refused(format!("no such device {}", volume)));
    }
    if !state.linked_to(super::ASSOC_MEMBER_OF, volume).is_empty() {
        return Ok(Reply::Refused(
            "device is a member of a storage group".to_string(),
        ));
    }
    if commit {
        state.remove(volume);
    }
    Ok(Reply::Done(Outcome::default()))
}

// =============================================================================
// Hardware ID Management Service
// =============================================================================

fn create_hardware_id(
    state: &mut ArrayState,
    system_name: &str,
    args: &Args<'_>,
    commit: bool,
) -> Result<Reply> {
    let value = args.string("StorageID")?;
    let id_type = HardwareIdType::from_code(args.int("IDType")?).map_err(|_| args.invalid("IDType"))?;
    let hardware_id = ArrayState::hardware_id_path(id_type, value);
    if state.objects.contains_key(&hardware_id) {
        return Ok(Reply::Refused(format!("{} is already registered", value)));
    }
    if commit {
        state.add_hardware_id(&system_path(system_name), id_type, value);
    }
    Ok(Reply::Done(Outcome {
        out_params: vec![ParamValue::new("HardwareID", hardware_id.clone())],
        results: vec![hardware_id],
        ..Default::default()
    }))
}

fn delete_hardware_id(state: &mut ArrayState, args: &Args<'_>, commit: bool) -> Result<Reply> {
    let hardware_id = args.reference("HardwareID")?;
    if !state.objects.contains_key(hardware_id) {
        return Ok(Reply::Refused(format!("no such hardware ID {}", hardware_id)));
    }
    if !state.linked_to(super::ASSOC_MEMBER_OF, hardware_id).is_empty() {
        return Ok(Reply::Refused(
            "hardware ID is a member of an initiator group".to_string(),
        ));
    }
    if commit {
        state.remove(hardware_id);
    }
    Ok(Reply::Done(Outcome::default()))
}

fn target_endpoints(state: &ArrayState, args: &Args<'_>) -> Result<InvokeOutput> {
    let hardware_id = args.reference("HardwareID")?;
    let value = state
        .property(hardware_id, "StorageID")
        .and_then(CimValue::as_str)
        .ok_or_else(|| Error::Transport(format!("CIM_ERR_NOT_FOUND: {}", hardware_id)))?;
    let endpoints: Vec<ObjectPath> = state
        .logins
        .iter()
        .filter(|(initiator, _)| initiator.eq_ignore_ascii_case(value))
        .map(|(_, port)| port.clone())
        .collect();
    Ok(InvokeOutput {
        return_code: 0,
        out_params: vec![ParamValue::new("TargetEndpoints", endpoints)],
    })
}
