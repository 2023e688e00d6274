use serde::{Deserialize, Serialize};

use crate::error::TextLayerError;
use crate::geometry::{Matrix, Viewport};

/// Ratio of glyph advance to font size used when a run carries no width.
pub const DEFAULT_CHAR_WIDTH_RATIO: f32 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextDirection {
    Ltr,
    Rtl,
    Ttb,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRun {
    pub text: String,
    pub transform: Matrix,
    /// Width in text space, scaled by the horizontal scale when laid out.
    pub width: Option<f32>,
    /// Height in text space, scaled by the vertical scale when laid out.
    pub height: Option<f32>,
    pub font_name: String,
    pub direction: Option<TextDirection>,
}

impl TextRun {
    pub fn new(text: impl Into<String>, transform: Matrix) -> Self {
        Self {
            text: text.into(),
            transform,
            width: None,
            height: None,
            font_name: String::new(),
            direction: None,
        }
    }

    pub fn with_size(mut self, width: Option<f32>, height: Option<f32>) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_font(mut self, font_name: impl Into<String>) -> Self {
        self.font_name = font_name.into();
        self
    }

    pub fn with_direction(mut self, direction: TextDirection) -> Self {
        self.direction = Some(direction);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextFragment {
    pub index: usize,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub font_size: f32,
    pub angle: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub text: String,
    pub font_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<TextDirection>,
}

impl TextFragment {
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    /// Average advance per character. Proportional fonts make this an
    /// approximation.
    pub fn char_width(&self) -> f32 {
        match self.char_count() {
            0 => 0.0,
            count => self.width / count as f32,
        }
    }

    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        let (sin, cos) = self.angle.sin_cos();
        let dx = x - self.x;
        let dy = y - self.y;
        let local_x = dx * cos + dy * sin;
        let local_y = -dx * sin + dy * cos;
        (0.0..=self.width).contains(&local_x) && (0.0..=self.height).contains(&local_y)
    }
}

/// Returns an empty layer when the viewport is missing or there are no runs.
/// A run with a non-finite transform fails the whole page.
pub fn build_fragments(
    runs: &[TextRun],
    viewport: Option<&Viewport>,
    char_width_ratio: f32,
) -> Result<Vec<TextFragment>, TextLayerError> {
    let Some(viewport) = viewport else {
        return Ok(Vec::new());
    };

    let mut fragments = Vec::with_capacity(runs.len());
    for (index, run) in runs.iter().enumerate() {
        if !run.transform.is_finite() {
            return Err(TextLayerError::MalformedTransform {
                run: index,
                matrix: run.transform.0,
            });
        }

        let placement = viewport.project(&run.transform);
        let width = match run.width {
            Some(width) => width * placement.scale_x,
            None => run.text.chars().count() as f32 * placement.font_size * char_width_ratio,
        };
        let height = match run.height {
            Some(height) => height * placement.scale_y,
            None => placement.font_size,
        };

        fragments.push(TextFragment {
            index,
            x: placement.x,
            y: placement.y,
            width,
            height,
            font_size: placement.font_size,
            angle: placement.angle,
            scale_x: placement.scale_x,
            scale_y: placement.scale_y,
            text: run.text.clone(),
            font_name: run.font_name.clone(),
            direction: run.direction,
        });
    }
    Ok(fragments)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct TextPosition {
    pub fragment: usize,
    /// Character (not byte) offset within the fragment.
    pub offset: usize,
}

impl TextPosition {
    pub fn new(fragment: usize, offset: usize) -> Self {
        Self { fragment, offset }
    }
}

#[derive(Debug, Clone)]
pub struct TextLayer {
    pub page_number: usize,
    pub viewport: Viewport,
    pub fragments: Vec<TextFragment>,
}

impl TextLayer {
    pub fn build(
        page_number: usize,
        runs: &[TextRun],
        viewport: Viewport,
        char_width_ratio: f32,
    ) -> Result<Self, TextLayerError> {
        let fragments = build_fragments(runs, Some(&viewport), char_width_ratio)?;
        Ok(Self {
            page_number,
            viewport,
            fragments,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Topmost fragment under a screen point. Later fragments paint over
    /// earlier ones.
    pub fn fragment_at(&self, x: f32, y: f32) -> Option<&TextFragment> {
        self.fragments
            .iter()
            .rev()
            .find(|fragment| fragment.contains_point(x, y))
    }

    /// Text between two positions (end exclusive), fragments joined without
    /// separators.
    pub fn text_between(&self, start: TextPosition, end: TextPosition) -> String {
        let (start, end) = if start <= end { (start, end) } else { (end, start) };
        let mut out = String::new();
        for fragment in self
            .fragments
            .iter()
            .skip(start.fragment)
            .take(end.fragment.saturating_sub(start.fragment) + 1)
        {
            let from = if fragment.index == start.fragment {
                start.offset
            } else {
                0
            };
            let to = if fragment.index == end.fragment {
                end.offset
            } else {
                usize::MAX
            };
            out.extend(
                fragment
                    .text
                    .chars()
                    .skip(from)
                    .take(to.saturating_sub(from)),
            );
        }
        out
    }

    pub fn plain_text(&self) -> String {
        self.fragments
            .iter()
            .map(|fragment| fragment.text.as_str())
            .collect()
    }
}
