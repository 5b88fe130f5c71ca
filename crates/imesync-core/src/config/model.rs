//! Configuration document model
//!
//! Every section field is optional so that the same types describe the full
//! durable document, the sparse patch overlay and the cached snapshots. The
//! built-in default of each field is declared next to it, which lets
//! [`Configuration::resolved`] and the typed getters present a total view.

use crate::config::escape::unescape_numeric_references;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Field-level right-biased merge
pub trait Merge {
    /// Overlay `overlay` on top of `self`; present overlay fields win
    fn merge(&self, overlay: &Self) -> Self;

    /// True when no field is set
    fn is_empty(&self) -> bool;
}

/// Literal-text normalization applied before a document is written
trait NormalizeText {
    fn normalize_text(&mut self);
}

impl NormalizeText for bool {
    fn normalize_text(&mut self) {}
}

impl NormalizeText for i64 {
    fn normalize_text(&mut self) {}
}

impl NormalizeText for String {
    fn normalize_text(&mut self) {
        if let std::borrow::Cow::Owned(text) = unescape_numeric_references(self) {
            *self = text;
        }
    }
}

impl NormalizeText for Vec<String> {
    fn normalize_text(&mut self) {
        self.iter_mut().for_each(NormalizeText::normalize_text);
    }
}

/// Single-field copy addressed by name (kebab-case or snake_case)
trait CopyField: Default + Merge {
    fn copy_field(&mut self, source: &Self, name: &str) -> bool;
}

macro_rules! config_section {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $(
                $(#[doc = $doc:literal])*
                $field:ident : $ty:ty = $default:expr,
            )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "kebab-case", default)]
        pub struct $name {
            $(
                $(#[doc = $doc])*
                #[serde(skip_serializing_if = "Option::is_none")]
                pub $field: Option<$ty>,
            )*
        }

        impl $name {
            /// Section with every field set to its built-in default
            pub fn defaults() -> Self {
                Self {
                    $( $field: Some($default), )*
                }
            }

            /// Names of the fields in this section, as written in documents
            pub fn field_names() -> Vec<String> {
                vec![$( stringify!($field).replace('_', "-") ),*]
            }

            $(
                $(#[doc = $doc])*
                pub fn $field(&self) -> $ty {
                    self.$field.clone().unwrap_or_else(|| $default)
                }
            )*

            fn normalize_text(&mut self) {
                $(
                    // regex lists are matched verbatim
                    if !stringify!($field).starts_with("regex") {
                        if let Some(value) = self.$field.as_mut() {
                            NormalizeText::normalize_text(value);
                        }
                    }
                )*
            }
        }

        impl CopyField for $name {
            fn copy_field(&mut self, source: &Self, name: &str) -> bool {
                let name = name.replace('-', "_");
                $(
                    if name == stringify!($field) {
                        self.$field = source.$field.clone();
                        return true;
                    }
                )*
                false
            }
        }

        impl Merge for $name {
            fn merge(&self, overlay: &Self) -> Self {
                Self {
                    $( $field: overlay.$field.clone().or_else(|| self.$field.clone()), )*
                }
            }

            fn is_empty(&self) -> bool {
                true $( && self.$field.is_none() )*
            }
        }
    };
}

config_section! {
    /// General application behavior
    pub struct GeneralSection {
        /// Mirror input schemas and dictionaries to cloud storage
        enable_cloud: bool = false,
        /// Files matching these patterns are not copied to or from the cloud mirror
        regex_on_copy_file: Vec<String> = vec![String::from("^.*[.]userdb.*$")],
        /// Wrap long lines in the built-in file editor
        text_editor_line_wrapping: bool = false,
    }
}

config_section! {
    /// Toolbar and candidate bar
    pub struct ToolbarSection {
        enable_toolbar: bool = true,
        height_of_toolbar: i64 = 55,
        display_app_icon_button: bool = true,
        display_keyboard_dismiss_button: bool = true,
        height_of_coding_area: i64 = 15,
        coding_area_font_size: i64 = 12,
        candidate_word_font_size: i64 = 20,
        candidate_comment_font_size: i64 = 14,
        display_index_of_candidate_word: bool = false,
        display_comment_of_candidate_word: bool = false,
    }
}

config_section! {
    /// Keyboard appearance and feedback
    pub struct KeyboardSection {
        /// Keyboard shown on launch
        use_keyboard_type: String = String::from("chinese"),
        display_button_bubbles: bool = false,
        enable_key_sounds: bool = false,
        enable_haptic_feedback: bool = false,
        haptic_feedback_intensity: i64 = 2,
        display_semicolon_button: bool = false,
        display_classify_symbol_button: bool = true,
        display_space_left_button: bool = true,
        key_value_of_space_left_button: String = String::from(","),
        display_space_right_button: bool = false,
        key_value_of_space_right_button: String = String::from("."),
        display_chinese_english_switch_button: bool = true,
        enable_nine_grid_of_numeric_keyboard: bool = true,
        symbols_of_grid_of_numeric_keyboard: Vec<String> = vec![
            String::from("+"),
            String::from("-"),
            String::from("*"),
            String::from("/"),
        ],
        lock_shift_state: bool = true,
        width_of_one_handed_keyboard: i64 = 80,
        pairs_of_symbols: Vec<String> = vec![
            String::from("()"),
            String::from("[]"),
            String::from("{}"),
            String::from("《》"),
        ],
        enable_symbol_keyboard: bool = true,
        enable_color_schema: bool = false,
        use_color_schema_for_light: String = String::new(),
        use_color_schema_for_dark: String = String::new(),
        /// Text shown on the space bar while the engine is loading
        loading_text_for_space_button: String = String::from("..."),
        label_text_for_space_button: String = String::from("空格"),
        show_current_input_schema_name_for_space_button: bool = false,
    }
}

config_section! {
    /// Input engine tuning
    pub struct RimeSection {
        maximum_number_of_candidate_words: i64 = 100,
        key_value_of_switch_simplified_and_traditional: String = String::from("simplification"),
        /// When false, dictionaries learned by the keyboard are pulled back before deploying
        override_dict_files: bool = true,
        /// Files pulled from the shared container when dictionaries are preserved
        regex_on_override_dict_files: Vec<String> = vec![
            String::from("^.*[.]userdb.*$"),
            String::from("^.*[.]txt$"),
        ],
        /// Files copied by a manual dictionary import from the shared container
        regex_on_copy_app_group_dict_file: Vec<String> = vec![
            String::from("^.*[.]userdb.*$"),
            String::from("^.*[.]txt$"),
        ],
        /// Active input schema ids
        selected_schemas: Vec<String> = Vec::new(),
    }
}

config_section! {
    /// Gesture sensitivity
    pub struct SwipeSection {
        enable_character_swipe: bool = true,
        character_swipe_distance: i64 = 20,
        enable_space_drag: bool = true,
        space_drag_sensitivity: i64 = 5,
        enable_delete_swipe: bool = true,
    }
}

/// The configuration document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Configuration {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub general: Option<GeneralSection>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub toolbar: Option<ToolbarSection>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyboard: Option<KeyboardSection>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rime: Option<RimeSection>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub swipe: Option<SwipeSection>,
}

/// Sparse overlay document, stored under a top-level `patch:` key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    #[serde(default)]
    pub patch: Configuration,
}

fn merge_section<T: Merge + Clone>(base: &Option<T>, overlay: &Option<T>) -> Option<T> {
    match (base, overlay) {
        (Some(b), Some(o)) => Some(b.merge(o)),
        (None, Some(o)) if !o.is_empty() => Some(o.clone()),
        (b, _) => b.clone(),
    }
}

impl Merge for Configuration {
    fn merge(&self, overlay: &Self) -> Self {
        Self {
            general: merge_section(&self.general, &overlay.general),
            toolbar: merge_section(&self.toolbar, &overlay.toolbar),
            keyboard: merge_section(&self.keyboard, &overlay.keyboard),
            rime: merge_section(&self.rime, &overlay.rime),
            swipe: merge_section(&self.swipe, &overlay.swipe),
        }
    }

    fn is_empty(&self) -> bool {
        self.general.as_ref().is_none_or(Merge::is_empty)
            && self.toolbar.as_ref().is_none_or(Merge::is_empty)
            && self.keyboard.as_ref().is_none_or(Merge::is_empty)
            && self.rime.as_ref().is_none_or(Merge::is_empty)
            && self.swipe.as_ref().is_none_or(Merge::is_empty)
    }
}

impl Configuration {
    /// Built-in defaults for every section
    pub fn defaults() -> Self {
        Self {
            general: Some(GeneralSection::defaults()),
            toolbar: Some(ToolbarSection::defaults()),
            keyboard: Some(KeyboardSection::defaults()),
            rime: Some(RimeSection::defaults()),
            swipe: Some(SwipeSection::defaults()),
        }
    }

    /// Total view: every field present, absent ones filled from built-in defaults
    pub fn resolved(&self) -> Self {
        Self::defaults().merge(self)
    }

    /// Apply a patch overlay (right-biased deep merge)
    pub fn apply(&self, patch: &Patch) -> Self {
        self.merge(&patch.patch)
    }

    pub fn general(&self) -> GeneralSection {
        GeneralSection::defaults().merge(&self.general.clone().unwrap_or_default())
    }

    pub fn toolbar(&self) -> ToolbarSection {
        ToolbarSection::defaults().merge(&self.toolbar.clone().unwrap_or_default())
    }

    pub fn keyboard(&self) -> KeyboardSection {
        KeyboardSection::defaults().merge(&self.keyboard.clone().unwrap_or_default())
    }

    pub fn rime(&self) -> RimeSection {
        RimeSection::defaults().merge(&self.rime.clone().unwrap_or_default())
    }

    pub fn swipe(&self) -> SwipeSection {
        SwipeSection::defaults().merge(&self.swipe.clone().unwrap_or_default())
    }

    /// Reset a single `section.field` to its value in `default`.
    ///
    /// Fails with `Decode` when the path does not name a known field.
    pub fn restore_field(&mut self, default: &Configuration, path: &str) -> Result<()> {
        let (section, field) = path
            .split_once('.')
            .ok_or_else(|| Error::decode(path, "expected <section>.<field>"))?;

        let found = match section {
            "general" => restore_in(&mut self.general, &default.general, field),
            "toolbar" => restore_in(&mut self.toolbar, &default.toolbar, field),
            "keyboard" => restore_in(&mut self.keyboard, &default.keyboard, field),
            "rime" => restore_in(&mut self.rime, &default.rime, field),
            "swipe" => restore_in(&mut self.swipe, &default.swipe, field),
            _ => return Err(Error::decode(path, format!("unknown section '{}'", section))),
        };

        if found {
            Ok(())
        } else {
            Err(Error::decode(path, format!("unknown field '{}'", field)))
        }
    }

    /// Turn escaped numeric character references in text fields into literal text
    pub fn normalize_text(&mut self) {
        if let Some(s) = self.general.as_mut() {
            s.normalize_text();
        }
        if let Some(s) = self.toolbar.as_mut() {
            s.normalize_text();
        }
        if let Some(s) = self.keyboard.as_mut() {
            s.normalize_text();
        }
        if let Some(s) = self.rime.as_mut() {
            s.normalize_text();
        }
        if let Some(s) = self.swipe.as_mut() {
            s.normalize_text();
        }
    }
}

fn restore_in<T: CopyField>(target: &mut Option<T>, default: &Option<T>, field: &str) -> bool {
    let fallback = T::default();
    let source = default.as_ref().unwrap_or(&fallback);
    let section = target.get_or_insert_with(T::default);
    let found = section.copy_field(source, field);
    if section.is_empty() {
        *target = None;
    }
    found
}

impl Patch {
    pub fn new(patch: Configuration) -> Self {
        Self { patch }
    }

    /// True when the overlay overrides nothing
    pub fn is_empty(&self) -> bool {
        self.patch.is_empty()
    }

    /// Combine two patches, later fields win
    pub fn and(&self, other: &Patch) -> Patch {
        Patch::new(self.patch.merge(&other.patch))
    }
}
