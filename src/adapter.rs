//! Format adapter: maps the generic container tree to and from the
//! dialogue graph.
//!
//! The container stores flat entry/reply lists and pointers as numeric
//! indices into them. Loading resolves every index once into a [`NodeId`];
//! saving recomputes every index from current list positions, so the file
//! never depends on stale caches.

use std::collections::BTreeMap;

use crate::dialog::{Dialog, DialogNode, EdgeKind, NodeId, NodeKind, DEFAULT_DELAY};
use crate::error::{DlgError, DlgResult};
use crate::gff::{GffStruct, GffValue, LocString};

// Root fields.
const F_DELAY_ENTRY: &str = "DelayEntry";
const F_DELAY_REPLY: &str = "DelayReply";
const F_END_SCRIPT: &str = "EndConversation";
const F_ABORT_SCRIPT: &str = "EndConverAbort";
const F_NUM_WORDS: &str = "NumWords";
const F_PREVENT_ZOOM: &str = "PreventZoomIn";
const F_ENTRY_LIST: &str = "EntryList";
const F_REPLY_LIST: &str = "ReplyList";
const F_START_LIST: &str = "StartingList";

// Node fields.
const F_TEXT: &str = "Text";
const F_SPEAKER: &str = "Speaker";
const F_ANIMATION: &str = "Animation";
const F_ANIM_LOOP: &str = "AnimLoop";
const F_SCRIPT: &str = "Script";
const F_ACTION_PARAMS: &str = "ActionParams";
const F_DELAY: &str = "Delay";
const F_COMMENT: &str = "Comment";
const F_SOUND: &str = "Sound";
const F_QUEST: &str = "Quest";
const F_QUEST_ENTRY: &str = "QuestEntry";
const F_POINTERS_FROM_ENTRY: &str = "RepliesList";
const F_POINTERS_FROM_REPLY: &str = "EntriesList";

// Pointer fields.
const F_INDEX: &str = "Index";
const F_IS_CHILD: &str = "IsChild";
const F_ACTIVE: &str = "Active";
const F_CONDITION_PARAMS: &str = "ConditionParams";
const F_LINK_COMMENT: &str = "LinkComment";

// Parameter pair fields.
const F_PARAM_KEY: &str = "Key";
const F_PARAM_VALUE: &str = "Value";

// =============================================================================
// Dialog -> container
// =============================================================================

/// Projects a dialog into the container tree. Fails if any pointer targets
/// a node that no longer exists; nothing corrupt is ever emitted.
pub fn dialog_to_gff(dialog: &Dialog) -> DlgResult<GffStruct> {
    let positions = list_positions(dialog);

    let mut root = GffStruct::root();
    root.add(F_DELAY_ENTRY, GffValue::Dword(dialog.delay_entry));
    root.add(F_DELAY_REPLY, GffValue::Dword(dialog.delay_reply));
    root.add(F_NUM_WORDS, GffValue::Dword(dialog.word_count));
    root.add(F_END_SCRIPT, GffValue::ResRef(dialog.script_end.clone()));
    root.add(F_ABORT_SCRIPT, GffValue::ResRef(dialog.script_abort.clone()));
    root.add(
        F_PREVENT_ZOOM,
        GffValue::Byte(u8::from(dialog.prevent_zoom)),
    );

    let mut entry_list = Vec::with_capacity(dialog.entries().len());
    for (position, &id) in dialog.entries().iter().enumerate() {
        entry_list.push(node_to_struct(dialog, id, position as u32, &positions)?);
    }
    root.add(F_ENTRY_LIST, GffValue::List(entry_list));

    let mut reply_list = Vec::with_capacity(dialog.replies().len());
    for (position, &id) in dialog.replies().iter().enumerate() {
        reply_list.push(node_to_struct(dialog, id, position as u32, &positions)?);
    }
    root.add(F_REPLY_LIST, GffValue::List(reply_list));

    let mut start_list = Vec::with_capacity(dialog.starts().len());
    for (position, pointer) in dialog.starts().iter().enumerate() {
        let mut st = GffStruct::new(position as u32);
        let index = *positions
            .get(&pointer.target)
            .ok_or_else(|| dangling(pointer.target))?;
        st.add(F_INDEX, GffValue::Dword(index));
        if !pointer.condition.is_empty() {
            st.add(F_ACTIVE, GffValue::ResRef(pointer.condition.clone()));
        }
        if !pointer.condition_params.is_empty() {
            st.add(
                F_CONDITION_PARAMS,
                GffValue::List(params_to_list(&pointer.condition_params)),
            );
        }
        start_list.push(st);
    }
    root.add(F_START_LIST, GffValue::List(start_list));

    Ok(root)
}

fn node_to_struct(
    dialog: &Dialog,
    id: NodeId,
    position: u32,
    positions: &BTreeMap<NodeId, u32>,
) -> DlgResult<GffStruct> {
    let node = dialog.node(id).ok_or(DlgError::UnknownNode(id.raw()))?;
    let mut st = GffStruct::new(position);

    if !node.text.is_empty() {
        st.add(F_TEXT, GffValue::LocString(node.text.clone()));
    }
    if node.kind == NodeKind::Entry && !node.speaker.is_empty() {
        st.add(F_SPEAKER, GffValue::String(node.speaker.clone()));
    }
    if node.animation != 0 {
        st.add(F_ANIMATION, GffValue::Dword(node.animation));
    }
    if node.animation_loop {
        st.add(F_ANIM_LOOP, GffValue::Byte(1));
    }
    if !node.action.is_empty() {
        st.add(F_SCRIPT, GffValue::ResRef(node.action.clone()));
    }
    if !node.action_params.is_empty() {
        st.add(
            F_ACTION_PARAMS,
            GffValue::List(params_to_list(&node.action_params)),
        );
    }
    if node.delay != DEFAULT_DELAY {
        st.add(F_DELAY, GffValue::Dword(node.delay));
    }
    if !node.comment.is_empty() {
        st.add(F_COMMENT, GffValue::String(node.comment.clone()));
    }
    if !node.sound.is_empty() {
        st.add(F_SOUND, GffValue::ResRef(node.sound.clone()));
    }
    if !node.quest.is_empty() {
        st.add(F_QUEST, GffValue::String(node.quest.clone()));
    }
    if let Some(quest_entry) = node.quest_entry {
        st.add(F_QUEST_ENTRY, GffValue::Dword(quest_entry));
    }

    let label = match node.kind {
        NodeKind::Entry => F_POINTERS_FROM_ENTRY,
        NodeKind::Reply => F_POINTERS_FROM_REPLY,
    };
    let mut pointer_list = Vec::with_capacity(node.pointers.len());
    for (slot, pointer) in node.pointers.iter().enumerate() {
        let mut ptr = GffStruct::new(slot as u32);
        let index = *positions
            .get(&pointer.target)
            .ok_or_else(|| dangling(pointer.target))?;
        ptr.add(F_INDEX, GffValue::Dword(index));
        ptr.add(F_IS_CHILD, GffValue::Byte(u8::from(pointer.edge.is_link())));
        if !pointer.condition.is_empty() {
            ptr.add(F_ACTIVE, GffValue::ResRef(pointer.condition.clone()));
        }
        if !pointer.condition_params.is_empty() {
            ptr.add(
                F_CONDITION_PARAMS,
                GffValue::List(params_to_list(&pointer.condition_params)),
            );
        }
        if !pointer.comment.is_empty() {
            ptr.add(F_LINK_COMMENT, GffValue::String(pointer.comment.clone()));
        }
        pointer_list.push(ptr);
    }
    st.add(label, GffValue::List(pointer_list));

    Ok(st)
}

fn dangling(target: NodeId) -> DlgError {
    DlgError::Validation(format!(
        "pointer targets missing node {}; run orphan pointer cleanup",
        target.raw()
    ))
}

fn list_positions(dialog: &Dialog) -> BTreeMap<NodeId, u32> {
    let mut positions = BTreeMap::new();
    for (position, &id) in dialog.entries().iter().enumerate() {
        positions.insert(id, position as u32);
    }
    for (position, &id) in dialog.replies().iter().enumerate() {
        positions.insert(id, position as u32);
    }
    positions
}

fn params_to_list(params: &BTreeMap<String, String>) -> Vec<GffStruct> {
    params
        .iter()
        .enumerate()
        .map(|(slot, (key, value))| {
            let mut st = GffStruct::new(slot as u32);
            st.add(F_PARAM_KEY, GffValue::String(key.clone()));
            st.add(F_PARAM_VALUE, GffValue::String(value.clone()));
            st
        })
        .collect()
}

// =============================================================================
// Container -> dialog
// =============================================================================

/// Builds a dialog from the container tree. Every pointer index is
/// resolved here, once; an out-of-range index fails the whole load.
pub fn dialog_from_gff(root: &GffStruct) -> DlgResult<Dialog> {
    let mut dialog = Dialog::new();
    dialog.delay_entry = root.get_u32(F_DELAY_ENTRY).unwrap_or(0);
    dialog.delay_reply = root.get_u32(F_DELAY_REPLY).unwrap_or(0);
    dialog.word_count = root.get_u32(F_NUM_WORDS).unwrap_or(0);
    dialog.script_end = root.get_resref(F_END_SCRIPT).cloned().unwrap_or_default();
    dialog.script_abort = root.get_resref(F_ABORT_SCRIPT).cloned().unwrap_or_default();
    dialog.prevent_zoom = root.get_u8(F_PREVENT_ZOOM).unwrap_or(0) != 0;

    let entry_structs = root.get_list(F_ENTRY_LIST).unwrap_or(&[]);
    let reply_structs = root.get_list(F_REPLY_LIST).unwrap_or(&[]);

    // Pass 1: create all nodes so indices can resolve to ids.
    let entry_ids: Vec<NodeId> = entry_structs.iter().map(|_| dialog.add_entry()).collect();
    let reply_ids: Vec<NodeId> = reply_structs.iter().map(|_| dialog.add_reply()).collect();

    for (&id, st) in entry_ids.iter().zip(entry_structs) {
        populate_node(&mut dialog, id, st);
    }
    for (&id, st) in reply_ids.iter().zip(reply_structs) {
        populate_node(&mut dialog, id, st);
    }

    // Pass 2: resolve pointer indices into node references.
    for (&id, st) in entry_ids.iter().zip(entry_structs) {
        let pointers = st.get_list(F_POINTERS_FROM_ENTRY).unwrap_or(&[]);
        attach_pointers(&mut dialog, id, pointers, &reply_ids, "reply")?;
    }
    for (&id, st) in reply_ids.iter().zip(reply_structs) {
        let pointers = st.get_list(F_POINTERS_FROM_REPLY).unwrap_or(&[]);
        attach_pointers(&mut dialog, id, pointers, &entry_ids, "entry")?;
    }

    for st in root.get_list(F_START_LIST).unwrap_or(&[]) {
        let index = st
            .get_u32(F_INDEX)
            .ok_or_else(|| DlgError::Mapping("start pointer missing Index".into()))?;
        let target = *entry_ids.get(index as usize).ok_or_else(|| {
            DlgError::Mapping(format!(
                "start index {index} out of range for {} entries",
                entry_ids.len()
            ))
        })?;
        dialog.add_start(target)?;
        if let Some(start) = dialog.starts_mut().last_mut() {
            start.condition = st.get_resref(F_ACTIVE).cloned().unwrap_or_default();
            start.condition_params =
                params_from_list(st.get_list(F_CONDITION_PARAMS).unwrap_or(&[]));
        }
    }

    Ok(dialog)
}

fn populate_node(dialog: &mut Dialog, id: NodeId, st: &GffStruct) {
    let Some(node) = dialog.node_mut(id) else {
        return;
    };
    fill_node(node, st);
}

fn fill_node(node: &mut DialogNode, st: &GffStruct) {
    node.text = st.get_locstring(F_TEXT).cloned().unwrap_or_else(LocString::new);
    if node.kind == NodeKind::Entry {
        node.speaker = st.get_str(F_SPEAKER).unwrap_or_default().to_string();
    }
    node.animation = st.get_u32(F_ANIMATION).unwrap_or(0);
    node.animation_loop = st.get_u8(F_ANIM_LOOP).unwrap_or(0) != 0;
    node.action = st.get_resref(F_SCRIPT).cloned().unwrap_or_default();
    node.action_params = params_from_list(st.get_list(F_ACTION_PARAMS).unwrap_or(&[]));
    node.delay = st.get_u32(F_DELAY).unwrap_or(DEFAULT_DELAY);
    node.comment = st.get_str(F_COMMENT).unwrap_or_default().to_string();
    node.sound = st.get_resref(F_SOUND).cloned().unwrap_or_default();
    node.quest = st.get_str(F_QUEST).unwrap_or_default().to_string();
    node.quest_entry = st.get_u32(F_QUEST_ENTRY);
}

fn attach_pointers(
    dialog: &mut Dialog,
    source: NodeId,
    pointer_structs: &[GffStruct],
    targets: &[NodeId],
    target_name: &str,
) -> DlgResult<()> {
    for st in pointer_structs {
        let index = st
            .get_u32(F_INDEX)
            .ok_or_else(|| DlgError::Mapping("pointer missing Index".into()))?;
        let target = *targets.get(index as usize).ok_or_else(|| {
            DlgError::Mapping(format!(
                "pointer index {index} out of range for {} {target_name} nodes",
                targets.len()
            ))
        })?;
        let edge = if st.get_u8(F_IS_CHILD).unwrap_or(0) != 0 {
            EdgeKind::Link
        } else {
            EdgeKind::Tree
        };
        dialog.add_pointer(source, target, edge)?;
        if let Some(pointer) = dialog
            .node_mut_internal(source)
            .and_then(|node| node.pointers.last_mut())
        {
            pointer.condition = st.get_resref(F_ACTIVE).cloned().unwrap_or_default();
            pointer.condition_params =
                params_from_list(st.get_list(F_CONDITION_PARAMS).unwrap_or(&[]));
            pointer.comment = st.get_str(F_LINK_COMMENT).unwrap_or_default().to_string();
        }
    }
    Ok(())
}

/// Key/value structs become a dictionary; duplicate keys resolve
/// last-write-wins, malformed pairs are skipped.
fn params_from_list(structs: &[GffStruct]) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    for st in structs {
        let (Some(key), Some(value)) = (st.get_str(F_PARAM_KEY), st.get_str(F_PARAM_VALUE)) else {
            continue;
        };
        params.insert(key.to_string(), value.to_string());
    }
    params
}
