use std::path::Path;
use std::sync::Arc;

use crate::asset::MeshAsset;
use crate::error::AssetError;

/// Internal marker some mesh models emit before regular text.
pub const START_TEXT_MARKER: &str = "<|start_text_id|>";
const OBJ_KEYWORD: &str = "obj";
const FENCE: &str = "```";

/// Best-effort OBJ body inside raw model output.
///
/// Prefers whatever follows the first `obj` (usually the language tag of a
/// ```` ```obj ```` fence) up to the closing fence. Without an `obj` tag,
/// falls back to the contents of the first fenced block, and returns the raw
/// text untouched when there is no fence yet.
///
/// The result always borrows from `raw`.
pub fn extract_obj(raw: &str) -> &str {
    if let Some((_, rest)) = raw.split_once(OBJ_KEYWORD) {
        return match rest.split_once(FENCE) {
            Some((body, _)) => body,
            // Mesh is still streaming in.
            None => rest,
        };
    }

    if let Some((_, rest)) = raw.split_once(FENCE) {
        return match rest.split_once(FENCE) {
            Some((body, _)) => body,
            None => rest,
        };
    }

    raw
}

/// Point in time view of a generation. Cheap to clone, the raw text is
/// shared.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MeshOutput {
    raw: Arc<str>,
}

impl MeshOutput {
    pub fn new(raw: impl Into<Arc<str>>) -> Self {
        Self { raw: raw.into() }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Raw output as it should be shown to a user.
    pub fn clean_message(&self) -> String {
        self.raw.replace(START_TEXT_MARKER, "").trim().to_string()
    }

    pub fn obj(&self) -> &str {
        extract_obj(&self.raw)
    }

    /// Rough vertex count: the number of `v` characters in the mesh text.
    pub fn vertices(&self) -> usize {
        self.obj().chars().filter(|c| *c == 'v').count()
    }

    /// Rough face count: the number of `f` characters in the mesh text.
    pub fn faces(&self) -> usize {
        self.obj().chars().filter(|c| *c == 'f').count()
    }

    pub fn make_asset(&self) -> Result<MeshAsset, AssetError> {
        MeshAsset::from_obj(self.obj())
    }

    /// Like [`MeshOutput::make_asset`], also writing the mesh text to `path`.
    pub fn write_asset(&self, path: &Path) -> Result<MeshAsset, AssetError> {
        MeshAsset::materialize(self.obj(), path)
    }
}

pub fn extract_mesh(raw: &str) -> MeshOutput {
    MeshOutput::new(raw)
}

#[cfg(test)]
mod test {
    use super::{extract_mesh, extract_obj, MeshOutput};

    const TABLE: &str = "Sure! ```obj\nv 0 0 0\nv 1 1 1\nf 1 2```";

    #[test]
    fn test_fenced_obj_block() {
        let output = extract_mesh(TABLE);
        assert!(output.obj().contains("v 0 0 0\nv 1 1 1\nf 1 2"));
        assert_eq!(output.obj(), "\nv 0 0 0\nv 1 1 1\nf 1 2");
        assert_eq!(output.vertices(), 2);
        assert_eq!(output.faces(), 1);
    }

    #[test]
    fn test_empty_output() {
        let output = extract_mesh("");
        assert_eq!(output.clean_message(), "");
        assert_eq!(output.obj(), "");
        assert_eq!(output.vertices(), 0);
        assert_eq!(output.faces(), 0);
        assert!(output.make_asset().is_err());
    }

    #[test]
    fn test_open_obj_block() {
        let raw = "Here you go\n```obj\nv 0 0 0\nv 1 0";
        assert_eq!(extract_obj(raw), "\nv 0 0 0\nv 1 0");
    }

    #[test]
    fn test_obj_remainder_is_kept() {
        // Second `obj` inside the block doesn't cut the mesh short.
        let raw = "```obj\n# object\nv 0 0 0\n```";
        assert_eq!(extract_obj(raw), "\n# object\nv 0 0 0\n");
    }

    #[test]
    fn test_plain_fence() {
        let raw = "Mesh:\n```\nv 0 0 0\n```\nEnjoy!";
        assert_eq!(extract_obj(raw), "\nv 0 0 0\n");

        // Only one fence so far, everything after it is returned.
        let raw = "Mesh:\n```\nv 0 0 0\nv 1";
        assert_eq!(extract_obj(raw), "\nv 0 0 0\nv 1");
    }

    #[test]
    fn test_no_markers() {
        let raw = "v 0 0 0\nv 1 1 1\nf 1 2 1";
        assert_eq!(extract_obj(raw), raw);
        assert_eq!(extract_mesh(raw).vertices(), 2);
    }

    #[test]
    fn test_counts_are_character_counts() {
        // Not a line parser: every `v` and `f` in the mesh text counts.
        let output = extract_mesh("```obj\nvv 1 2 3\nvn 0 0 1\nf 1 2 3 # fff\n```");
        assert_eq!(output.vertices(), 3);
        assert_eq!(output.faces(), 4);

        // Prose outside the mesh text doesn't count.
        let output = extract_mesh("vivid fluffy verbs ```obj\nv 0 0 0\n``` very fine");
        assert_eq!(output.vertices(), 1);
        assert_eq!(output.faces(), 0);
    }

    #[test]
    fn test_closed_mesh_does_not_change() {
        let closed = extract_mesh(TABLE);
        let longer = extract_mesh(&format!("{TABLE}\nLet me know if you want an obj file of a chair"));
        assert_eq!(closed.obj(), longer.obj());
    }

    #[test]
    fn test_obj_is_substring_of_raw() {
        let samples = [
            "",
            TABLE,
            "```",
            "obj",
            "``````",
            "text ``` more text",
            "```obj\nv 1 2 3",
            "<|start_text_id|>obj```",
        ];
        for raw in samples {
            let output = MeshOutput::new(raw);
            assert!(raw.contains(output.obj()), "{raw:?}");
        }
    }

    #[test]
    fn test_clean_message() {
        let output = MeshOutput::new("<|start_text_id|>  Here is a cube<|start_text_id|>\n");
        assert_eq!(output.clean_message(), "Here is a cube");
        assert_eq!(output.raw(), "<|start_text_id|>  Here is a cube<|start_text_id|>\n");
    }

    #[test]
    fn test_make_asset() {
        let output = extract_mesh("```obj\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n```");
        let asset = output.make_asset().expect("valid mesh");
        assert_eq!(asset.vertices.len(), 3);
        assert_eq!(asset.faces.len(), 1);
    }
}
