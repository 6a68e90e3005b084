mod sliding_window_log_tests;
