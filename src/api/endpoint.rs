pub type Endpoint = str;

pub const LOGIN: &Endpoint = "/mon-compte-en-ligne/je-me-connecte";
/* Daily series for one month: {DAILY_DATA}/{YYYY}/{MM}/{counter_id} */
pub const DAILY_DATA: &Endpoint = "/mon-compte-en-ligne/statJData";
/* Monthly history plus trailing aggregates: {HISTORY_DATA}/{counter_id} */
pub const HISTORY_DATA: &Endpoint = "/mon-compte-en-ligne/statMData";
