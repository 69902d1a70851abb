use serenity::{
    all::ButtonStyle,
    builder::{CreateActionRow, CreateButton},
};

/// IDs personalizados para los botones
pub mod button_ids {
    pub const RESUME_ACCEPT: &str = "resume_accept";
    pub const RESUME_DECLINE: &str = "resume_decline";
}

/// Botones de la oferta de continuar una cola guardada.
pub fn resume_controls() -> Vec<CreateActionRow> {
    vec![CreateActionRow::Buttons(vec![
        CreateButton::new(button_ids::RESUME_ACCEPT)
            .label("Continuar")
            .emoji('▶')
            .style(ButtonStyle::Success),
        CreateButton::new(button_ids::RESUME_DECLINE)
            .label("Empezar de cero")
            .emoji('🗑')
            .style(ButtonStyle::Secondary),
    ])]
}
