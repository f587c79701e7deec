//! Built-in entity types.
//!
//! Operators can register further types from configuration; these two ship
//! with every deployment.

use crate::{
  field::{FieldDef, FieldKind},
  registry::{CapabilityNames, EntityTypeConfig, ExclusiveRule},
};

pub const CHRONICLE: &str = "chronicle";
pub const COORDINATOR: &str = "coordinator";

pub fn builtin() -> Vec<EntityTypeConfig> { vec![chronicle(), coordinator()] }

fn identity(key: &str, multiple: bool) -> FieldDef {
  FieldDef::new(key, FieldKind::Identity { multiple })
}

/// A local game ("chronicle") with a head storyteller, a council member and
/// assistant storytellers.
///
/// A satellite chronicle is represented on council by its parent, so marking
/// it as a satellite clears its own council member; a non-satellite has no
/// parent.
pub fn chronicle() -> EntityTypeConfig {
  EntityTypeConfig {
    type_key:          CHRONICLE.into(),
    slug_attribute:    "chronicle_slug".into(),
    slug_pattern:      None,
    capabilities:      CapabilityNames::for_type(CHRONICLE),
    fields:            vec![
      FieldDef::new("chronicle_slug", FieldKind::text()).required(),
      FieldDef::new("title", FieldKind::Text { max_len: Some(120) }).required(),
      FieldDef::new("genres", FieldKind::MultiSelect { options: vec![] }),
      FieldDef::new("game_type", FieldKind::Select {
        options: vec!["tabletop".into(), "larp".into(), "hybrid".into(), "virtual".into()],
      }),
      FieldDef::new("region", FieldKind::text()),
      FieldDef::new("active_since", FieldKind::Date),
      FieldDef::new("web_url", FieldKind::Url),
      FieldDef::new("description", FieldKind::RichText),
      FieldDef::new("banner", FieldKind::Upload),
      FieldDef::new("chronicle_probationary", FieldKind::Checkbox),
      FieldDef::new("chronicle_satellite", FieldKind::Checkbox),
      FieldDef::new("chronicle_parent", FieldKind::text())
        .required_when("chronicle_satellite", "1"),
      identity("hst_info", false).required(),
      identity("cm_info", false),
      identity("ast_list", true),
    ],
    staff_fields:      vec!["hst_info".into(), "cm_info".into(), "ast_list".into()],
    access_templates:  vec![
      "chronicle/{slug}/hst".into(),
      "chronicle/{slug}/cm".into(),
      "chronicle/{slug}/staff".into(),
    ],
    immutable_fields:  vec![],
    restricted_fields: vec![
      "chronicle_probationary".into(),
      "chronicle_satellite".into(),
      "chronicle_parent".into(),
    ],
    exclusive_rules:   vec![
      ExclusiveRule {
        condition_attr:  "chronicle_satellite".into(),
        condition_value: "1".into(),
        clear_attrs:     vec!["cm_info".into()],
      },
      ExclusiveRule {
        condition_attr:  "chronicle_satellite".into(),
        condition_value: "0".into(),
        clear_attrs:     vec!["chronicle_parent".into()],
      },
    ],
  }
}

/// An organisation-wide coordinator office and its sub-coordinators.
pub fn coordinator() -> EntityTypeConfig {
  EntityTypeConfig {
    type_key:          COORDINATOR.into(),
    slug_attribute:    "coordinator_slug".into(),
    slug_pattern:      None,
    capabilities:      CapabilityNames::for_type(COORDINATOR),
    fields:            vec![
      FieldDef::new("coordinator_slug", FieldKind::text()).required(),
      FieldDef::new("title", FieldKind::Text { max_len: Some(120) }).required(),
      FieldDef::new("office_type", FieldKind::Select {
        options: vec!["genre".into(), "administrative".into(), "executive".into()],
      }),
      FieldDef::new("office_email", FieldKind::Email),
      FieldDef::new("term_start", FieldKind::Date),
      FieldDef::new("description", FieldKind::RichText),
      identity("coordinator_info", false).required(),
      identity("subcoord_list", true),
    ],
    staff_fields:      vec!["coordinator_info".into(), "subcoord_list".into()],
    access_templates:  vec![
      "coordinator/{slug}/coordinator".into(),
      "coordinator/{slug}/sub-coordinator".into(),
    ],
    immutable_fields:  vec!["term_start".into()],
    restricted_fields: vec!["office_type".into()],
    exclusive_rules:   vec![],
  }
}
