/// 进程级屏蔽词表
pub mod blocklist;
/// 输入清洗与表单校验
pub mod validation;

pub use blocklist::{Blocklist, BlocklistFile, contains_blocked_content};
pub use validation::{
    FormData, FormValidation, MAX_LENGTHS, Sanitized, escape_html, sanitize_input,
    validate_form_data,
};
