//! Skin payload projection
//!
//! The wire protocol surfaces player skins as a structure full of raw binary
//! fields. Downstream consumers receive a fixed JSON projection of that
//! structure with every binary sub-field encoded as unpadded standard base64.
//! The field names of the projection are an external contract shared with the
//! processing side and must not change.

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced when decoding a skin projection back into its raw form
#[derive(Debug, Error)]
pub enum SkinError {
    #[error("invalid base64 in field {field}")]
    InvalidBase64 {
        field: &'static str,
        #[source]
        source: base64::DecodeError,
    },
}

/// One animation frame attached to a skin, raw form
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SkinAnimation {
    pub image_width: u32,
    pub image_height: u32,
    pub image_data: Vec<u8>,
    pub animation_type: u32,
    pub frame_count: f32,
    pub expression_type: u32,
}

/// One persona customization piece, passed through the projection verbatim
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PersonaPiece {
    #[serde(rename = "PieceID")]
    pub piece_id: String,
    pub piece_type: String,
    #[serde(rename = "PackID")]
    pub pack_id: String,
    pub default: bool,
    #[serde(rename = "ProductID")]
    pub product_id: String,
}

/// Tint colours for one persona piece type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PieceTintColour {
    pub piece_type: String,
    pub colours: Vec<String>,
}

/// A player skin as decoded from the wire, binary fields untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Skin {
    pub skin_id: String,
    pub play_fab_id: String,
    pub skin_resource_patch: Vec<u8>,
    pub skin_image_width: u32,
    pub skin_image_height: u32,
    pub skin_data: Vec<u8>,
    pub animations: Vec<SkinAnimation>,
    pub cape_image_width: u32,
    pub cape_image_height: u32,
    pub cape_data: Vec<u8>,
    pub skin_geometry: Vec<u8>,
    pub animation_data: Vec<u8>,
    pub geometry_data_engine_version: Vec<u8>,
    pub premium_skin: bool,
    pub persona_skin: bool,
    pub persona_cape_on_classic_skin: bool,
    pub primary_user: bool,
    pub cape_id: String,
    pub full_id: String,
    pub skin_colour: String,
    pub arm_size: String,
    pub persona_pieces: Vec<PersonaPiece>,
    pub piece_tint_colours: Vec<PieceTintColour>,
    pub trusted: bool,
}

/// Animation frame in projected form, image bytes base64-encoded
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SkinAnimationJson {
    pub image_width: u32,
    pub image_height: u32,
    pub image_data: String,
    pub animation_type: u32,
    pub frame_count: f32,
    pub expression_type: u32,
}

/// The JSON projection of a skin carried inside queued messages.
///
/// Field names are part of the external contract; the `ID` suffixes do not
/// follow PascalCase and are renamed explicitly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SkinJson {
    #[serde(rename = "SkinID")]
    pub skin_id: String,
    #[serde(rename = "PlayFabID")]
    pub play_fab_id: String,
    pub skin_resource_patch: String,
    pub skin_image_width: u32,
    pub skin_image_height: u32,
    pub skin_data: String,
    pub animations: Vec<SkinAnimationJson>,
    pub cape_image_width: u32,
    pub cape_image_height: u32,
    pub cape_data: String,
    pub skin_geometry: String,
    pub animation_data: String,
    pub geometry_data_engine_version: String,
    pub premium_skin: bool,
    pub persona_skin: bool,
    pub persona_cape_on_classic_skin: bool,
    pub primary_user: bool,
    #[serde(rename = "CapeID")]
    pub cape_id: String,
    #[serde(rename = "FullID")]
    pub full_id: String,
    pub skin_colour: String,
    pub arm_size: String,
    pub persona_pieces: Vec<PersonaPiece>,
    pub piece_tint_colours: Vec<PieceTintColour>,
    pub trusted: bool,
}

impl Skin {
    /// Project the raw skin into its JSON form
    pub fn to_json(&self) -> SkinJson {
        let animations = self
            .animations
            .iter()
            .map(|a| SkinAnimationJson {
                image_width: a.image_width,
                image_height: a.image_height,
                image_data: STANDARD_NO_PAD.encode(&a.image_data),
                animation_type: a.animation_type,
                frame_count: a.frame_count,
                expression_type: a.expression_type,
            })
            .collect();

        SkinJson {
            skin_id: self.skin_id.clone(),
            play_fab_id: self.play_fab_id.clone(),
            skin_resource_patch: STANDARD_NO_PAD.encode(&self.skin_resource_patch),
            skin_image_width: self.skin_image_width,
            skin_image_height: self.skin_image_height,
            skin_data: STANDARD_NO_PAD.encode(&self.skin_data),
            animations,
            cape_image_width: self.cape_image_width,
            cape_image_height: self.cape_image_height,
            cape_data: STANDARD_NO_PAD.encode(&self.cape_data),
            skin_geometry: STANDARD_NO_PAD.encode(&self.skin_geometry),
            animation_data: STANDARD_NO_PAD.encode(&self.animation_data),
            geometry_data_engine_version: String::from_utf8_lossy(
                &self.geometry_data_engine_version,
            )
            .into_owned(),
            premium_skin: self.premium_skin,
            persona_skin: self.persona_skin,
            persona_cape_on_classic_skin: self.persona_cape_on_classic_skin,
            primary_user: self.primary_user,
            cape_id: self.cape_id.clone(),
            full_id: self.full_id.clone(),
            skin_colour: self.skin_colour.clone(),
            arm_size: self.arm_size.clone(),
            persona_pieces: self.persona_pieces.clone(),
            piece_tint_colours: self.piece_tint_colours.clone(),
            trusted: self.trusted,
        }
    }
}

fn decode_field(field: &'static str, value: &str) -> Result<Vec<u8>, SkinError> {
    STANDARD_NO_PAD
        .decode(value)
        .map_err(|source| SkinError::InvalidBase64 { field, source })
}

impl SkinJson {
    /// Decode the projection back into the raw skin structure
    pub fn to_skin(&self) -> Result<Skin, SkinError> {
        let mut animations = Vec::with_capacity(self.animations.len());
        for a in &self.animations {
            animations.push(SkinAnimation {
                image_width: a.image_width,
                image_height: a.image_height,
                image_data: decode_field("Animations.ImageData", &a.image_data)?,
                animation_type: a.animation_type,
                frame_count: a.frame_count,
                expression_type: a.expression_type,
            });
        }

        Ok(Skin {
            skin_id: self.skin_id.clone(),
            play_fab_id: self.play_fab_id.clone(),
            skin_resource_patch: decode_field("SkinResourcePatch", &self.skin_resource_patch)?,
            skin_image_width: self.skin_image_width,
            skin_image_height: self.skin_image_height,
            skin_data: decode_field("SkinData", &self.skin_data)?,
            animations,
            cape_image_width: self.cape_image_width,
            cape_image_height: self.cape_image_height,
            cape_data: decode_field("CapeData", &self.cape_data)?,
            skin_geometry: decode_field("SkinGeometry", &self.skin_geometry)?,
            animation_data: decode_field("AnimationData", &self.animation_data)?,
            geometry_data_engine_version: self.geometry_data_engine_version.clone().into_bytes(),
            premium_skin: self.premium_skin,
            persona_skin: self.persona_skin,
            persona_cape_on_classic_skin: self.persona_cape_on_classic_skin,
            primary_user: self.primary_user,
            cape_id: self.cape_id.clone(),
            full_id: self.full_id.clone(),
            skin_colour: self.skin_colour.clone(),
            arm_size: self.arm_size.clone(),
            persona_pieces: self.persona_pieces.clone(),
            piece_tint_colours: self.piece_tint_colours.clone(),
            trusted: self.trusted,
        })
    }
}

/// Colour codes and channel separators servers embed in display names
static NAME_DECORATIONS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\||(?:§.?)").unwrap());

/// Strip server decorations from a player display name.
///
/// Keeps only the first line, unwraps the `{"k": "..."}` wrapper some servers
/// put around names, and removes colour codes and separators.
pub fn clean_player_name(name: &str) -> String {
    let first_line = name.lines().next().unwrap_or("");

    #[derive(Deserialize)]
    struct Wrapped {
        k: String,
    }

    let base = serde_json::from_str::<Wrapped>(first_line)
        .map(|w| w.k)
        .unwrap_or_else(|_| first_line.to_string());

    NAME_DECORATIONS.replace_all(&base, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_skin() -> Skin {
        Skin {
            skin_id: "skin-1".to_string(),
            play_fab_id: "fab-1".to_string(),
            skin_resource_patch: br#"{"geometry":{"default":"geometry.humanoid"}}"#.to_vec(),
            skin_image_width: 64,
            skin_image_height: 64,
            skin_data: vec![0xde, 0xad, 0xbe, 0xef],
            animations: vec![SkinAnimation {
                image_width: 32,
                image_height: 32,
                image_data: vec![1, 2, 3],
                animation_type: 1,
                frame_count: 4.0,
                expression_type: 0,
            }],
            cape_image_width: 64,
            cape_image_height: 32,
            cape_data: vec![9, 8, 7],
            skin_geometry: b"geometry-data".to_vec(),
            animation_data: vec![],
            geometry_data_engine_version: b"1.16.0".to_vec(),
            premium_skin: true,
            persona_skin: false,
            persona_cape_on_classic_skin: false,
            primary_user: true,
            cape_id: "cape-1".to_string(),
            full_id: "full-1".to_string(),
            skin_colour: "#b37b62".to_string(),
            arm_size: "wide".to_string(),
            persona_pieces: vec![PersonaPiece {
                piece_id: "piece-1".to_string(),
                piece_type: "persona_body".to_string(),
                pack_id: "pack-1".to_string(),
                default: true,
                product_id: String::new(),
            }],
            piece_tint_colours: vec![PieceTintColour {
                piece_type: "persona_mouth".to_string(),
                colours: vec!["#ffffff".to_string()],
            }],
            trusted: true,
        }
    }

    #[test]
    fn projection_round_trip_is_lossless() {
        let skin = sample_skin();
        let decoded = skin.to_json().to_skin().unwrap();
        assert_eq!(skin, decoded);
    }

    #[test]
    fn projection_uses_contract_field_names() {
        let value = serde_json::to_value(sample_skin().to_json()).unwrap();
        let object = value.as_object().unwrap();
        for key in [
            "SkinID",
            "PlayFabID",
            "SkinResourcePatch",
            "SkinData",
            "CapeData",
            "SkinGeometry",
            "AnimationData",
            "GeometryDataEngineVersion",
            "CapeID",
            "FullID",
            "SkinColour",
            "ArmSize",
            "PersonaPieces",
            "PieceTintColours",
            "Trusted",
        ] {
            assert!(object.contains_key(key), "missing contract field {key}");
        }
    }

    #[test]
    fn binary_fields_are_unpadded_base64() {
        let json = sample_skin().to_json();
        assert_eq!(json.skin_data, "3q2+7w");
        assert!(!json.skin_data.ends_with('='));
    }

    #[test]
    fn invalid_base64_is_reported_with_field() {
        let mut json = sample_skin().to_json();
        json.cape_data = "!!!".to_string();
        let err = json.to_skin().unwrap_err();
        assert!(matches!(err, SkinError::InvalidBase64 { field: "CapeData", .. }));
    }

    #[test]
    fn clean_player_name_strips_decorations() {
        assert_eq!(clean_player_name("§aSteve§r"), "Steve");
        assert_eq!(clean_player_name("Alex|zone12"), "Alexzone12");
        assert_eq!(clean_player_name("  Steve  "), "Steve");
    }

    #[test]
    fn clean_player_name_unwraps_display_wrapper() {
        assert_eq!(clean_player_name(r#"{"k": "§6Herobrine"}"#), "Herobrine");
    }

    #[test]
    fn clean_player_name_keeps_first_line_only() {
        assert_eq!(clean_player_name("Steve\nrank: vip"), "Steve");
    }
}
