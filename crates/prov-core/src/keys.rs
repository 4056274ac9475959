//! Claves de origen (`source key`) tipadas.
//!
//! Toda clave vive bajo el espacio `xp.{experimento}`. Los segmentos aportados
//! por el usuario (nombres de experimento, literal o función) se escapan para
//! que un punto dentro de un nombre no pueda colisionar con la estructura.
use std::fmt;

use crate::constants::KEY_NAMESPACE;

/// Escapa un segmento de usuario: `%` -> `%25`, `.` -> `%2E`.
pub fn escape(segment: &str) -> String {
    segment.replace('%', "%25").replace('.', "%2E")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKey<'a> {
    Spec { experiment: &'a str },
    Literal { experiment: &'a str, name: &'a str },
    Binding { experiment: &'a str, literal: &'a str, hash: &'a str },
    Artifact { experiment: &'a str, location: &'a str },
    Action { experiment: &'a str, function: &'a str },
    Dummy { experiment: &'a str },
    Peek { experiment: &'a str },
    Trial { experiment: &'a str },
}

impl NodeKey<'_> {
    pub fn render(&self) -> String {
        match *self {
            NodeKey::Spec { experiment } => spec_prefix(experiment),
            NodeKey::Literal { experiment, name } => format!("{}.literal.{}", spec_prefix(experiment), escape(name)),
            NodeKey::Binding { experiment, literal, hash } => {
                format!("{}.{hash}", NodeKey::Literal { experiment, name: literal }.render())
            }
            NodeKey::Artifact { experiment, location } => {
                format!("{}.artifact.{}", spec_prefix(experiment), escape(location))
            }
            NodeKey::Action { experiment, function } => {
                format!("{}.action.{}", spec_prefix(experiment), escape(function))
            }
            NodeKey::Dummy { experiment } => format!("{}.dummy", spec_prefix(experiment)),
            NodeKey::Peek { experiment } => format!("{}.peek", spec_prefix(experiment)),
            NodeKey::Trial { experiment } => format!("{}.peek.trials", spec_prefix(experiment)),
        }
    }

    /// Nombre legible que acompaña a la clave en el store.
    pub fn display_name(&self) -> String {
        match *self {
            NodeKey::Spec { experiment } => experiment.to_string(),
            NodeKey::Literal { name, .. } => name.to_string(),
            NodeKey::Binding { literal, hash, .. } => format!("{literal}={hash}"),
            NodeKey::Artifact { location, .. } => location.to_string(),
            NodeKey::Action { function, .. } => function.to_string(),
            NodeKey::Dummy { .. } => "dummy".into(),
            NodeKey::Peek { .. } => "peek".into(),
            NodeKey::Trial { .. } => "trials".into(),
        }
    }
}

impl fmt::Display for NodeKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Rol de un recurso dentro de una clave de linaje.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceRole {
    Literal,
    Artifact,
}

impl ResourceRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceRole::Literal => "literal",
            ResourceRole::Artifact => "artifact",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineageKey<'a> {
    BindingToDummy { experiment: &'a str, literal: &'a str, hash: &'a str },
    ArtifactToDummy { experiment: &'a str, hash: &'a str },
    ActionInput { experiment: &'a str, function: &'a str, role: ResourceRole, ident: &'a str },
    ActionOutput { experiment: &'a str, function: &'a str, role: ResourceRole, ident: &'a str },
    TrialArtifact { experiment: &'a str, hash: &'a str },
    TrialOutput { experiment: &'a str, hash: &'a str },
    TrialGhost { experiment: &'a str, literal: &'a str, hash: &'a str },
    ForkOrigin { experiment: &'a str },
}

impl LineageKey<'_> {
    pub fn render(&self) -> String {
        match *self {
            LineageKey::BindingToDummy { experiment, literal, hash } => {
                format!("{}.edge.literal.{}.{hash}", NodeKey::Dummy { experiment }.render(), escape(literal))
            }
            LineageKey::ArtifactToDummy { experiment, hash } => {
                format!("{}.edge.artifact.{hash}", NodeKey::Dummy { experiment }.render())
            }
            LineageKey::ActionInput { experiment, function, role, ident } => {
                format!("{}.in.{}.{}",
                        NodeKey::Action { experiment, function }.render(),
                        role.as_str(),
                        escape(ident))
            }
            LineageKey::ActionOutput { experiment, function, role, ident } => {
                format!("{}.out.{}.{}",
                        NodeKey::Action { experiment, function }.render(),
                        role.as_str(),
                        escape(ident))
            }
            LineageKey::TrialArtifact { experiment, hash } => {
                format!("{}.artifact.{hash}", NodeKey::Trial { experiment }.render())
            }
            LineageKey::TrialOutput { experiment, hash } => format!("{}.0.{hash}", NodeKey::Trial { experiment }.render()),
            LineageKey::TrialGhost { experiment, literal, hash } => {
                format!("{}.lit.{}.{hash}", NodeKey::Trial { experiment }.render(), escape(literal))
            }
            LineageKey::ForkOrigin { experiment } => format!("{}.fork", spec_prefix(experiment)),
        }
    }
}

impl fmt::Display for LineageKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn spec_prefix(experiment: &str) -> String {
    format!("{KEY_NAMESPACE}.{}", escape(experiment))
}
