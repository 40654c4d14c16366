mod precond;
