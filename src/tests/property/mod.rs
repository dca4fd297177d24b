mod addresser_props;
mod enhancer_props;
mod isbn_props;
mod mock_provider_props;
mod session_props;
