use cursive::theme::Color;

#[derive(Debug, Clone, Copy)]
pub struct LineColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl From<LineColor> for Color {
    fn from(color: LineColor) -> Self {
        Color::Rgb(color.r, color.g, color.b)
    }
}

pub static RED_COLOR: LineColor = LineColor { r: 255, g: 0, b: 0 };
pub static GREEN_COLOR: LineColor = LineColor { r: 0, g: 255, b: 0 };

pub static YELLOW_COLOR: LineColor = LineColor {
    r: 255,
    g: 255,
    b: 0,
};
