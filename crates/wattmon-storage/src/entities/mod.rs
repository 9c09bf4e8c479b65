pub mod alert;
pub mod alert_rule;
pub mod device;
pub mod forecast;
pub mod reading;
